//! Typed runtime settings.
//!
//! pkgsift is configured entirely through `PKGSIFT_*` environment variables so
//! that the reload sub-invocations spawned by the selector inherit the exact
//! settings of the session that launched them. [`EnvironmentConfig`] collects
//! the raw values; [`PkgsiftSettings`] resolves them once into typed settings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use tracing::{debug, warn};

use crate::data::KnownManagers;
use crate::sources::BackendQuery;

pub mod env;

pub use env::EnvironmentConfig;

const DEFAULT_QUERY_LIMIT: usize = 40;
const DEFAULT_JS_QUERY_LIMIT: usize = 200;
const DEFAULT_NO_QUERY_LIMIT: usize = 120;
const DEFAULT_NO_QUERY_NPM_LIMIT: usize = 120;
const FALLBACK_NPM_LIMIT: usize = 500;
const DEFAULT_RANK_BUDGET: usize = 2000;
const DEFAULT_INSTALLED_TTL: Duration = Duration::from_secs(300);
const DEFAULT_RELOAD_MIN_CHARS: usize = 2;
const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_millis(120);

/// All settings, resolved once per invocation.
#[derive(Debug, Clone)]
pub struct PkgsiftSettings {
    pub cache: CacheSettings,
    pub search: SearchSettings,
    pub markers: MarkerSettings,
    pub rank: RankSettings,
    pub reload: ReloadSettings,
    pub perf_trace: bool,
}

impl PkgsiftSettings {
    /// Resolve settings from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let env = EnvironmentConfig::from_env()?;
        Ok(Self::from_env_config(&env))
    }

    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        let settings = Self {
            cache: CacheSettings::from_env_config(env),
            search: SearchSettings::from_env_config(env),
            markers: MarkerSettings::from_env_config(env),
            rank: RankSettings::from_env_config(env),
            reload: ReloadSettings::from_env_config(env),
            perf_trace: env.flag("PERF_TRACE", false),
        };
        debug!("resolved settings: {:?}", settings);
        settings
    }
}

impl Default for PkgsiftSettings {
    fn default() -> Self {
        Self::from_env_config(&EnvironmentConfig::default())
    }
}

/// Disk cache policy for search rows and installed sets.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root: PathBuf,
    /// `Some` when the global switch forces every manager on or off
    pub force_query_cache: Option<bool>,
    pub bypass_query_cache: bool,
    pub skip_query_cache_write: bool,
    pub global_query_ttl: Option<Duration>,
    pub manager_query_ttls: HashMap<KnownManagers, Duration>,
    pub installed_cache_enabled: bool,
    pub installed_ttl: Duration,
}

impl CacheSettings {
    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        let force_query_cache = match env.get_bool("ENABLE_QUERY_CACHE") {
            Ok(value) => value,
            Err(err) => {
                warn!("Ignoring invalid switch: {:#}", err);
                None
            }
        };

        let manager_query_ttls = KnownManagers::all()
            .into_iter()
            .filter_map(|manager| {
                let key = format!("{}_QUERY_CACHE_TTL", manager.env_key());
                env.get_secs(&key).map(|ttl| (manager, ttl))
            })
            .collect();

        Self {
            root: resolve_cache_root(env),
            force_query_cache,
            bypass_query_cache: env.flag("BYPASS_QUERY_CACHE", false),
            skip_query_cache_write: env.flag("SKIP_QUERY_CACHE_WRITE", false),
            global_query_ttl: env.get_secs("QUERY_CACHE_TTL"),
            manager_query_ttls,
            installed_cache_enabled: !env.flag("DISABLE_INSTALLED_CACHE", false),
            installed_ttl: env
                .get_secs("INSTALLED_CACHE_TTL")
                .unwrap_or(DEFAULT_INSTALLED_TTL),
        }
    }

    /// A cache rooted at `root` with built-in defaults for everything else.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        let mut settings = Self::from_env_config(&EnvironmentConfig::default());
        settings.root = root.into();
        settings
    }

    /// Whether the search cache is switched on for `manager` at all.
    #[must_use]
    pub fn query_cache_enabled(&self, manager: &KnownManagers) -> bool {
        self.force_query_cache
            .unwrap_or_else(|| manager.default_query_cache_ttl().is_some())
    }

    /// Manager override, then global override, then the manager's default.
    /// Zero means entries are never trusted.
    #[must_use]
    pub fn query_ttl(&self, manager: &KnownManagers) -> Duration {
        self.manager_query_ttls
            .get(manager)
            .copied()
            .or(self.global_query_ttl)
            .or_else(|| manager.default_query_cache_ttl())
            .unwrap_or(Duration::ZERO)
    }

    /// Search cache reads are allowed for `manager`.
    #[must_use]
    pub fn query_reads_enabled(&self, manager: &KnownManagers) -> bool {
        !self.bypass_query_cache
            && self.query_cache_enabled(manager)
            && !self.query_ttl(manager).is_zero()
    }

    /// Search cache writes are allowed for `manager`.
    #[must_use]
    pub fn query_writes_enabled(&self, manager: &KnownManagers) -> bool {
        self.query_reads_enabled(manager) && !self.skip_query_cache_write
    }
}

/// `PKGSIFT_CACHE_DIR`, else the platform cache directory, else a temp subpath.
pub fn resolve_cache_root(env: &EnvironmentConfig) -> PathBuf {
    if let Some(dir) = env.get("CACHE_DIR") {
        return PathBuf::from(dir);
    }
    match ProjectDirs::from("", "", "pkgsift") {
        Some(dirs) => dirs.cache_dir().to_path_buf(),
        None => std::env::temp_dir().join("pkgsift-cache"),
    }
}

/// Per-manager result budgets.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub query_limit: usize,
    pub js_query_limit: usize,
    /// Rows kept per manager when there is no query; 0 keeps `query_limit`
    pub no_query_limit: usize,
    /// `--searchlimit` handed to npm
    pub npm_search_limit: usize,
    pub bun_npm_fallback: bool,
}

impl SearchSettings {
    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        let positive = |key: &str, default: usize| match env.get_i64(key) {
            Some(value) if value > 0 => value as usize,
            _ => default,
        };

        let js_query_limit = match env.get_i64("JS_QUERY_PER_MANAGER_LIMIT") {
            Some(value) if value > 0 => value as usize,
            _ => positive("NPM_QUERY_PER_MANAGER_LIMIT", DEFAULT_JS_QUERY_LIMIT),
        };

        let npm_search_limit = match env.get_i64("NO_QUERY_NPM_LIMIT") {
            Some(value) if value <= 0 => FALLBACK_NPM_LIMIT,
            Some(value) => value as usize,
            None => DEFAULT_NO_QUERY_NPM_LIMIT,
        };

        Self {
            query_limit: positive("QUERY_PER_MANAGER_LIMIT", DEFAULT_QUERY_LIMIT),
            js_query_limit,
            no_query_limit: env
                .get_i64("NO_QUERY_RESULT_LIMIT")
                .map(|value| value.max(0) as usize)
                .unwrap_or(DEFAULT_NO_QUERY_LIMIT),
            npm_search_limit,
            bun_npm_fallback: env.flag("BUN_NPM_FALLBACK", false),
        }
    }

    /// Effective query and limits for one manager.
    ///
    /// An empty query is rewritten to the manager's probe string and gets the
    /// no-query budget; npm and bun get the larger JS budget for real queries.
    pub fn plan_for(&self, manager: &KnownManagers, query: &str) -> BackendQuery {
        let query = query.trim();
        if query.is_empty() {
            let limit = if self.no_query_limit > 0 {
                self.no_query_limit
            } else {
                self.query_limit
            };
            return BackendQuery {
                query: manager.empty_query_probe().to_string(),
                limit,
                aux_limit: self.npm_search_limit,
            };
        }

        let limit = if manager.is_js_ecosystem() {
            self.js_query_limit
        } else {
            self.query_limit
        };
        BackendQuery {
            query: query.to_string(),
            limit,
            aux_limit: self.npm_search_limit,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_env_config(&EnvironmentConfig::default())
    }
}

/// How rows get their installed-status prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerMode {
    /// Every row gets a neutral two-space prefix
    Skip,
    /// Installed sets are looked up and rows marked `* ` or `  `
    Lookup,
}

#[derive(Debug, Clone, Default)]
pub struct MarkerSettings {
    pub skip: bool,
    pub no_query_markers: bool,
}

impl MarkerSettings {
    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        Self {
            skip: env.flag("SKIP_INSTALLED_MARKERS", false),
            no_query_markers: env.flag("NO_QUERY_INSTALLED_MARKERS", false),
        }
    }

    /// Lookups are skipped when disabled outright, and for a listing without a
    /// query across several managers unless explicitly opted back in.
    #[must_use]
    pub fn mode_for(&self, query: &str, manager_count: usize) -> MarkerMode {
        if self.skip {
            return MarkerMode::Skip;
        }
        if query.trim().is_empty() && manager_count > 1 && !self.no_query_markers {
            return MarkerMode::Skip;
        }
        MarkerMode::Lookup
    }
}

#[derive(Debug, Clone)]
pub struct RankSettings {
    /// Rows scored at most; larger inputs are capped round-robin. 0 disables.
    pub budget: usize,
    /// Ranked rows returned for a query. 0 disables.
    pub result_limit: usize,
}

impl RankSettings {
    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        Self {
            budget: env
                .get_i64("RANK_BUDGET")
                .map(|value| value.max(0) as usize)
                .unwrap_or(DEFAULT_RANK_BUDGET),
            result_limit: env
                .get_i64("QUERY_RESULT_LIMIT")
                .map(|value| value.max(0) as usize)
                .unwrap_or(0),
        }
    }
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RANK_BUDGET,
            result_limit: 0,
        }
    }
}

/// When live reload is wired into an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMode {
    Always,
    Auto,
    Single,
    Never,
}

impl ReloadMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "never" | "off" | "0" | "false" | "no" => ReloadMode::Never,
            "single" => ReloadMode::Single,
            "always" | "on" | "1" | "true" | "yes" => ReloadMode::Always,
            _ => ReloadMode::Auto,
        }
    }

    #[must_use]
    pub fn enabled_for(&self, manager_count: usize) -> bool {
        match self {
            ReloadMode::Always | ReloadMode::Auto => true,
            ReloadMode::Single => manager_count == 1,
            ReloadMode::Never => false,
        }
    }
}

/// Preferred reload delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPreference {
    /// Push when the selector exposes a control endpoint, else sync
    Auto,
    Push,
    Sync,
}

impl TransportPreference {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "push" | "ipc" | "listen" | "http" => TransportPreference::Push,
            "sync" | "reload" | "off" | "none" => TransportPreference::Sync,
            _ => TransportPreference::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReloadSettings {
    pub mode: ReloadMode,
    pub transport: TransportPreference,
    /// Queries shorter than this (in characters) serve the baseline
    pub min_chars: usize,
    pub debounce: Duration,
    pub global_timeout: Option<Duration>,
    pub manager_timeouts: HashMap<KnownManagers, Duration>,
    pub bypass_query_cache: bool,
    pub manager_override: Option<KnownManagers>,
    pub managers: Vec<KnownManagers>,
    pub fallback_file: Option<PathBuf>,
    pub session_root: Option<PathBuf>,
}

impl ReloadSettings {
    pub fn from_env_config(env: &EnvironmentConfig) -> Self {
        let manager_timeouts = KnownManagers::all()
            .into_iter()
            .filter_map(|manager| {
                let key = format!("{}_RELOAD_TIMEOUT_MS", manager.env_key());
                env.get_millis(&key).map(|timeout| (manager, timeout))
            })
            .collect();

        Self {
            mode: ReloadMode::parse(&env.get_or("RELOAD_MODE", "auto")),
            transport: TransportPreference::parse(&env.get_or("RELOAD_TRANSPORT", "auto")),
            min_chars: env
                .get_i64("RELOAD_MIN_CHARS")
                .map(|value| value.max(0) as usize)
                .unwrap_or(DEFAULT_RELOAD_MIN_CHARS),
            debounce: env
                .get_millis("RELOAD_DEBOUNCE_MS")
                .unwrap_or(DEFAULT_RELOAD_DEBOUNCE),
            global_timeout: env.get_millis("RELOAD_TIMEOUT_MS"),
            manager_timeouts,
            bypass_query_cache: env.flag("RELOAD_BYPASS_QUERY_CACHE", true),
            manager_override: env.get("RELOAD_MANAGER").map(|name| KnownManagers::from_name(name)),
            managers: env.get_managers("RELOAD_MANAGERS"),
            fallback_file: env.get("RELOAD_FALLBACK_FILE").map(PathBuf::from),
            session_root: env.get("SESSION_TMP_ROOT").map(PathBuf::from),
        }
    }

    /// Per-call budget for `manager` when `active` managers share a reload.
    ///
    /// `None` means unbounded: a lone manager is never cut off, and an
    /// explicit zero disables the limit.
    #[must_use]
    pub fn timeout_for(&self, manager: &KnownManagers, active: usize) -> Option<Duration> {
        if active <= 1 {
            return None;
        }
        let timeout = self
            .manager_timeouts
            .get(manager)
            .copied()
            .or(self.global_timeout)
            .unwrap_or_else(|| manager.default_reload_timeout());
        (!timeout.is_zero()).then_some(timeout)
    }
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self::from_env_config(&EnvironmentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn settings(pairs: &[(&str, &str)]) -> PkgsiftSettings {
        PkgsiftSettings::from_env_config(&EnvironmentConfig::from_pairs(pairs.iter().copied()))
    }

    #[test]
    fn test_cache_defaults_follow_manager_policy() {
        let cache = settings(&[]).cache;
        assert!(cache.query_cache_enabled(&KnownManagers::Apt));
        assert!(!cache.query_cache_enabled(&KnownManagers::Dnf));
        assert_eq!(cache.query_ttl(&KnownManagers::Brew), Duration::from_secs(120));
        assert_eq!(cache.query_ttl(&KnownManagers::Dnf), Duration::ZERO);
        assert!(cache.query_reads_enabled(&KnownManagers::Bun));
        assert!(!cache.query_reads_enabled(&KnownManagers::Npm));
    }

    #[test]
    fn test_ttl_priority_order() {
        let cache = settings(&[("QUERY_CACHE_TTL", "60"), ("APT_QUERY_CACHE_TTL", "10")]).cache;
        assert_eq!(cache.query_ttl(&KnownManagers::Apt), Duration::from_secs(10));
        assert_eq!(cache.query_ttl(&KnownManagers::Brew), Duration::from_secs(60));
    }

    #[test]
    fn test_global_switch_and_bypass() {
        let off = settings(&[("ENABLE_QUERY_CACHE", "0")]).cache;
        assert!(!off.query_reads_enabled(&KnownManagers::Apt));

        let forced = settings(&[("ENABLE_QUERY_CACHE", "1"), ("QUERY_CACHE_TTL", "30")]).cache;
        assert!(forced.query_reads_enabled(&KnownManagers::Dnf));

        let bypass = settings(&[("BYPASS_QUERY_CACHE", "true")]).cache;
        assert!(!bypass.query_reads_enabled(&KnownManagers::Apt));

        let read_only = settings(&[("SKIP_QUERY_CACHE_WRITE", "yes")]).cache;
        assert!(read_only.query_reads_enabled(&KnownManagers::Apt));
        assert!(!read_only.query_writes_enabled(&KnownManagers::Apt));
    }

    #[test]
    fn test_cache_root_override() {
        let cache = settings(&[("CACHE_DIR", "/tmp/pkgsift-test")]).cache;
        assert_eq!(cache.root, PathBuf::from("/tmp/pkgsift-test"));
    }

    #[rstest]
    #[case(KnownManagers::Apt, "", "a", 120)]
    #[case(KnownManagers::Brew, "", "aa", 120)]
    #[case(KnownManagers::Flatpak, "", "", 120)]
    #[case(KnownManagers::Apt, " ripgrep ", "ripgrep", 40)]
    #[case(KnownManagers::Npm, "react", "react", 200)]
    #[case(KnownManagers::Bun, "react", "react", 200)]
    fn test_plan_for(
        #[case] manager: KnownManagers,
        #[case] query: &str,
        #[case] expected_query: &str,
        #[case] expected_limit: usize,
    ) {
        let plan = SearchSettings::default().plan_for(&manager, query);
        assert_eq!(plan.query, expected_query);
        assert_eq!(plan.limit, expected_limit);
        assert_eq!(plan.aux_limit, 120);
    }

    #[test]
    fn test_limit_fallbacks() {
        let search = settings(&[
            ("QUERY_PER_MANAGER_LIMIT", "0"),
            ("JS_QUERY_PER_MANAGER_LIMIT", "-1"),
            ("NPM_QUERY_PER_MANAGER_LIMIT", "75"),
            ("NO_QUERY_RESULT_LIMIT", "0"),
            ("NO_QUERY_NPM_LIMIT", "0"),
        ])
        .search;
        assert_eq!(search.query_limit, 40);
        assert_eq!(search.js_query_limit, 75);
        assert_eq!(search.npm_search_limit, 500);
        assert_eq!(search.plan_for(&KnownManagers::Apt, "").limit, 40);
    }

    #[test]
    fn test_marker_mode() {
        let markers = MarkerSettings::default();
        assert_eq!(markers.mode_for("rg", 3), MarkerMode::Lookup);
        assert_eq!(markers.mode_for("", 1), MarkerMode::Lookup);
        assert_eq!(markers.mode_for("", 2), MarkerMode::Skip);

        let opted_in = MarkerSettings {
            skip: false,
            no_query_markers: true,
        };
        assert_eq!(opted_in.mode_for("", 2), MarkerMode::Lookup);

        let skip = MarkerSettings {
            skip: true,
            no_query_markers: true,
        };
        assert_eq!(skip.mode_for("rg", 1), MarkerMode::Skip);
    }

    #[test]
    fn test_reload_timeouts() {
        let reload = settings(&[("RELOAD_TIMEOUT_MS", "900"), ("BREW_RELOAD_TIMEOUT_MS", "0")]).reload;
        assert_eq!(reload.timeout_for(&KnownManagers::Apt, 1), None);
        assert_eq!(
            reload.timeout_for(&KnownManagers::Apt, 2),
            Some(Duration::from_millis(900))
        );
        assert_eq!(reload.timeout_for(&KnownManagers::Brew, 2), None);

        let defaults = ReloadSettings::default();
        assert_eq!(
            defaults.timeout_for(&KnownManagers::Emerge, 3),
            Some(KnownManagers::Emerge.default_reload_timeout())
        );
    }

    #[rstest]
    #[case("never", ReloadMode::Never, false, false)]
    #[case("single", ReloadMode::Single, true, false)]
    #[case("always", ReloadMode::Always, true, true)]
    #[case("", ReloadMode::Auto, true, true)]
    fn test_reload_mode(
        #[case] raw: &str,
        #[case] expected: ReloadMode,
        #[case] one: bool,
        #[case] many: bool,
    ) {
        let mode = ReloadMode::parse(raw);
        assert_eq!(mode, expected);
        assert_eq!(mode.enabled_for(1), one);
        assert_eq!(mode.enabled_for(3), many);
    }

    #[test]
    fn test_reload_session_inputs() {
        let reload = settings(&[
            ("RELOAD_MANAGER", "homebrew"),
            ("RELOAD_MANAGERS", "apt,brew"),
            ("RELOAD_FALLBACK_FILE", "/tmp/base.tsv"),
            ("RELOAD_MIN_CHARS", "3"),
            ("RELOAD_DEBOUNCE_MS", "0"),
        ])
        .reload;
        assert_eq!(reload.manager_override, Some(KnownManagers::Brew));
        assert_eq!(reload.managers, vec![KnownManagers::Apt, KnownManagers::Brew]);
        assert_eq!(reload.fallback_file, Some(PathBuf::from("/tmp/base.tsv")));
        assert_eq!(reload.min_chars, 3);
        assert_eq!(reload.debounce, Duration::ZERO);
        assert!(reload.bypass_query_cache);
        assert_eq!(reload.transport, TransportPreference::Auto);
    }
}
