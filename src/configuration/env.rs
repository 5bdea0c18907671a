use crate::data::KnownManagers;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw `PKGSIFT_*` values captured from the environment.
///
/// Keys passed to the accessors omit the prefix and are matched
/// case-insensitively; blank values count as unset.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub prefix: String,
    /// Full variable names (prefix included) to raw values
    pub variables: HashMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            prefix: "PKGSIFT_".to_string(),
            variables: HashMap::new(),
        }
    }
}

impl EnvironmentConfig {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            variables: HashMap::new(),
        }
    }

    /// Build a configuration from explicit `(suffix, value)` pairs instead of
    /// the process environment. Keys are given without the prefix.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value);
        }
        config
    }

    /// Snapshot the current process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        Ok(config)
    }

    /// Captures every variable carrying the prefix.
    pub fn load_from_env(&mut self) -> Result<()> {
        let prefix = self.prefix.clone();
        self.variables.extend(
            env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .filter(|(key, _)| key.starts_with(&prefix)),
        );
        debug!("captured {} {}* variables", self.variables.len(), self.prefix);
        Ok(())
    }

    /// Get environment variable value, ignoring blank values
    pub fn get(&self, key: &str) -> Option<&String> {
        let full_key = format!("{}{}", self.prefix, key.to_uppercase());
        self.variables
            .get(&full_key)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Set a variable by its unprefixed key
    pub fn set<V: Into<String>>(&mut self, key: &str, value: V) {
        let full_key = format!("{}{}", self.prefix, key.to_uppercase());
        self.variables.insert(full_key, value.into());
    }

    /// Strictly parsed boolean; `None` when unset.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|value| Self::parse_bool(value).with_context(|| format!("{}{key}", self.prefix)))
            .transpose()
    }

    /// Lenient switch: unset or unparsable values fall back to `default`.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get_bool(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!("Ignoring invalid switch: {:#}", err);
                default
            }
        }
    }

    /// Integer value; unparsable values are reported and treated as unset.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        let raw = self.get(key)?;
        match raw.trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid integer {}{}={}", self.prefix, key, raw);
                None
            }
        }
    }

    /// Whole seconds; negative values are treated as zero.
    pub fn get_secs(&self, key: &str) -> Option<Duration> {
        self.get_i64(key)
            .map(|secs| Duration::from_secs(secs.max(0) as u64))
    }

    /// Whole milliseconds; negative values are treated as zero.
    pub fn get_millis(&self, key: &str) -> Option<Duration> {
        self.get_i64(key)
            .map(|ms| Duration::from_millis(ms.max(0) as u64))
    }

    /// Comma-separated manager list (aliases normalized, duplicates dropped)
    pub fn get_managers(&self, key: &str) -> Vec<KnownManagers> {
        self.get(key)
            .map(|csv| KnownManagers::parse_list(csv))
            .unwrap_or_default()
    }

    /// Accepts true/false, 1/0, yes/no, on/off and enabled/disabled.
    pub fn parse_bool(value: &str) -> Result<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
            "false" | "0" | "no" | "off" | "disabled" => Ok(false),
            other => Err(anyhow::anyhow!("'{other}' is not a switch value (expected on/off, true/false, 1/0)"))
        }
    }

    /// Every recognized variable (prefixed) with a one-line description.
    pub fn get_supported_variables(&self) -> BTreeMap<String, String> {
        let prefix = &self.prefix;
        let entries: &[(&str, &str)] = &[
            ("CACHE_DIR", "Override cache root directory"),
            ("ENABLE_QUERY_CACHE", "Force search cache on or off for every manager (true/false)"),
            ("BYPASS_QUERY_CACHE", "Skip search cache reads and writes (true/false)"),
            ("SKIP_QUERY_CACHE_WRITE", "Read the search cache but never write it (true/false)"),
            ("QUERY_CACHE_TTL", "Search cache TTL in seconds for all managers"),
            ("<MGR>_QUERY_CACHE_TTL", "Search cache TTL in seconds for one manager (e.g. APT)"),
            ("DISABLE_INSTALLED_CACHE", "Disable the installed-package cache (true/false)"),
            ("INSTALLED_CACHE_TTL", "Installed-package cache TTL in seconds (default 300)"),
            ("QUERY_PER_MANAGER_LIMIT", "Rows kept per manager for a query (default 40)"),
            ("JS_QUERY_PER_MANAGER_LIMIT", "Rows kept per npm/bun query (default 200)"),
            ("NO_QUERY_RESULT_LIMIT", "Rows kept per manager without a query (default 120)"),
            ("NO_QUERY_NPM_LIMIT", "npm search limit passed to npm (default 120)"),
            ("QUERY_RESULT_LIMIT", "Cap on ranked rows for a query (0 = no cap)"),
            ("RANK_BUDGET", "Rows scored before round-robin capping (default 2000, 0 = no cap)"),
            ("SKIP_INSTALLED_MARKERS", "Never look up installed packages (true/false)"),
            ("NO_QUERY_INSTALLED_MARKERS", "Mark installed packages in multi-manager listings without a query"),
            ("BUN_NPM_FALLBACK", "Let bun fall back to npm even when other managers are active"),
            ("RELOAD_MODE", "Live reload: always, auto, single, or never"),
            ("RELOAD_TRANSPORT", "Reload transport: auto, push, or sync"),
            ("RELOAD_MIN_CHARS", "Shortest query that triggers a search on reload (default 2)"),
            ("RELOAD_DEBOUNCE_MS", "Delay before a reload searches (default 120)"),
            ("RELOAD_TIMEOUT_MS", "Per-manager reload timeout in milliseconds (0 = none)"),
            ("<MGR>_RELOAD_TIMEOUT_MS", "Reload timeout for one manager in milliseconds"),
            ("RELOAD_BYPASS_QUERY_CACHE", "Bypass the search cache during reload (default true)"),
            ("RELOAD_MANAGER", "Single manager used by reload invocations"),
            ("RELOAD_MANAGERS", "Comma-separated managers used by reload invocations"),
            ("RELOAD_FALLBACK_FILE", "Baseline rows re-emitted when a reload cannot search"),
            ("SESSION_TMP_ROOT", "Externally managed session directory"),
            ("PERF_TRACE", "Log pipeline stage timings (true/false)"),
        ];

        entries
            .iter()
            .map(|(key, description)| (format!("{prefix}{key}"), description.to_string()))
            .collect()
    }

    pub fn print_env_help(&self) {
        println!("pkgsift Environment Variables:");
        println!("==============================");

        for (var_name, description) in self.get_supported_variables() {
            println!("  {var_name:<38} {description}");
        }

        println!("\nExamples:");
        println!("  export {}CACHE_DIR=/tmp/pkgsift", self.prefix);
        println!("  export {}APT_QUERY_CACHE_TTL=600", self.prefix);
        println!("  export {}RELOAD_MODE=never", self.prefix);
        println!("  export {}SKIP_INSTALLED_MARKERS=true", self.prefix);
    }
}
