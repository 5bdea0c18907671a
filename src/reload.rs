//! Live reload inside an interactive session.
//!
//! Every keystroke in the selector becomes one `pkgsift reload -- <query>`
//! invocation, either run by fzf itself (sync transport) or pushed through its
//! listen endpoint by `pkgsift notify` (push transport). A reload always
//! prints something: fresh rows when the pipeline produced any, otherwise the
//! session baseline written when the session started.
//!
//! ```text
//! Idle ──keystroke──▶ AwaitingReload ──rows──────▶ Served
//!                          │
//!                          └──short query/error──▶ FallbackServed
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::configuration::{MarkerMode, PkgsiftSettings, TransportPreference};
use crate::data::{detect_available_managers, Candidate, KnownManagers};
use crate::errors::{PkgsiftError, Result};
use crate::ipc::shell_quote;
use crate::pipeline::{render_rows, SearchPipeline, SearchRequest};
use crate::selector::SelectorCapabilities;
use crate::sources::{CommandLocator, PackageAdapter};

/// Placeholder fzf substitutes with the current query. fzf single-quotes the
/// value itself, so it must stay bare.
pub const QUERY_PLACEHOLDER: &str = "{q}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Showing the initial list
    Idle,
    /// A reload is resolving managers or waiting on the pipeline
    AwaitingReload,
    /// Fresh rows were emitted
    Served,
    /// The baseline was re-emitted (short query or failure)
    FallbackServed,
}

/// Final state of one reload and the bytes it emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub state: ReloadState,
    pub output: Vec<u8>,
}

/// Serves reload requests for one session.
pub struct ReloadController {
    settings: PkgsiftSettings,
    fallback_file: PathBuf,
    pipeline: SearchPipeline,
    locator: Arc<dyn CommandLocator>,
    state: ReloadState,
}

impl ReloadController {
    /// Fails when no baseline file is configured; that is a setup error of the
    /// reload invocation, not something to paper over with an empty list.
    pub fn new(
        settings: &PkgsiftSettings,
        adapter: Arc<dyn PackageAdapter>,
        locator: Arc<dyn CommandLocator>,
    ) -> Result<Self> {
        let fallback_file = settings
            .reload
            .fallback_file
            .clone()
            .ok_or_else(|| anyhow!("PKGSIFT_RELOAD_FALLBACK_FILE is required for reload"))?;

        let mut settings = settings.clone();
        settings.cache.bypass_query_cache = settings.reload.bypass_query_cache;
        settings.cache.skip_query_cache_write = true;
        settings.markers.skip = true;

        let pipeline = SearchPipeline::from_settings(&settings, adapter, locator.clone());
        Ok(Self {
            settings,
            fallback_file,
            pipeline,
            locator,
            state: ReloadState::Idle,
        })
    }

    #[must_use]
    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Managers a reload may use.
    ///
    /// An explicit single manager wins; otherwise every member of the session
    /// list must be supported and ready, or the whole reload is refused. With
    /// neither set, the detected defaults are used.
    pub fn resolve_managers(&self) -> Result<Vec<KnownManagers>> {
        let reload = &self.settings.reload;
        let usable = |manager: &KnownManagers| manager.is_supported() && manager.is_ready(self.locator.as_ref());

        if let Some(manager) = &reload.manager_override {
            return if usable(manager) {
                Ok(vec![manager.clone()])
            } else {
                Err(PkgsiftError::NoBackends(format!(
                    "'{}' is not available",
                    manager.as_str()
                )))
            };
        }

        if !reload.managers.is_empty() {
            if let Some(bad) = reload.managers.iter().find(|m| !usable(m)) {
                return Err(PkgsiftError::NoBackends(format!(
                    "'{}' in the session manager list is not available",
                    bad.as_str()
                )));
            }
            return Ok(reload.managers.clone());
        }

        let detected = detect_available_managers(self.locator.as_ref(), true);
        if detected.is_empty() {
            return Err(PkgsiftError::NoBackends("none detected".to_string()));
        }
        Ok(detected)
    }

    pub async fn handle(&mut self, query: &str) -> ReloadOutcome {
        self.state = ReloadState::AwaitingReload;
        let query = query.trim();

        if query.chars().count() < self.settings.reload.min_chars {
            debug!("query '{}' below reload threshold, serving baseline", query);
            return self.serve_fallback();
        }

        if !self.settings.reload.debounce.is_zero() {
            tokio::time::sleep(self.settings.reload.debounce).await;
        }

        match self.fresh_rows(query).await {
            Ok(rows) if !rows.is_empty() => {
                self.state = ReloadState::Served;
                ReloadOutcome {
                    state: self.state,
                    output: render_rows(&rows).into_bytes(),
                }
            }
            Ok(_) => {
                debug!("reload for '{}' found nothing, serving baseline", query);
                self.serve_fallback()
            }
            Err(err) => {
                debug!("reload for '{}' failed ({}), serving baseline", query, err);
                self.serve_fallback()
            }
        }
    }

    async fn fresh_rows(&self, query: &str) -> Result<Vec<Candidate>> {
        let managers = self.resolve_managers()?;
        let request = SearchRequest {
            query: query.to_string(),
            managers,
            marker_mode: Some(MarkerMode::Skip),
            timeouts: true,
        };
        self.pipeline.run(&request).await
    }

    fn serve_fallback(&mut self) -> ReloadOutcome {
        self.state = ReloadState::FallbackServed;
        let output = match fs::read(&self.fallback_file) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("baseline {} unreadable: {}", self.fallback_file.display(), err);
                Vec::new()
            }
        };
        ReloadOutcome {
            state: self.state,
            output,
        }
    }
}

/// Reload delivery chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sync,
    Push,
}

impl Transport {
    pub fn choose(preference: TransportPreference, caps: &SelectorCapabilities) -> Self {
        match preference {
            TransportPreference::Sync => Transport::Sync,
            TransportPreference::Push | TransportPreference::Auto if caps.listen => Transport::Push,
            _ => Transport::Sync,
        }
    }
}

/// Shell command lines handed to fzf key bindings.
#[derive(Debug, Clone)]
pub struct ReloadCommand {
    pub exe: PathBuf,
    pub manager_override: Option<KnownManagers>,
    pub managers: Vec<KnownManagers>,
    pub fallback_file: PathBuf,
    pub bypass_cache: bool,
}

impl ReloadCommand {
    fn session_env(&self) -> Vec<String> {
        let override_name = self
            .manager_override
            .as_ref()
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let csv = self
            .managers
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            format!("PKGSIFT_RELOAD_MANAGER={}", shell_quote(&override_name)),
            format!("PKGSIFT_RELOAD_MANAGERS={}", shell_quote(&csv)),
            format!(
                "PKGSIFT_RELOAD_FALLBACK_FILE={}",
                shell_quote(&self.fallback_file.display().to_string())
            ),
        ]
    }

    fn exe_quoted(&self) -> String {
        shell_quote(&self.exe.display().to_string())
    }

    /// `reload` invocation with `query_arg` spliced in verbatim.
    pub fn reload_line(&self, query_arg: &str) -> String {
        let mut parts = vec![
            "PKGSIFT_SKIP_INSTALLED_MARKERS=1".to_string(),
            format!("PKGSIFT_BYPASS_QUERY_CACHE={}", u8::from(self.bypass_cache)),
            "PKGSIFT_SKIP_QUERY_CACHE_WRITE=1".to_string(),
        ];
        parts.extend(self.session_env());
        parts.push(self.exe_quoted());
        parts.push("reload".to_string());
        parts.push("--".to_string());
        parts.push(query_arg.to_string());
        parts.join(" ")
    }

    /// Reload line for a literal query.
    pub fn reload_line_for(&self, query: &str) -> String {
        self.reload_line(&shell_quote(query))
    }

    /// Reload line fzf fills in with the live query.
    pub fn selector_reload(&self) -> String {
        self.reload_line(QUERY_PLACEHOLDER)
    }

    /// `notify` line fzf runs silently on every change.
    pub fn selector_notify(&self) -> String {
        let mut parts = self.session_env();
        parts.push(self.exe_quoted());
        parts.push("notify".to_string());
        parts.push("--".to_string());
        parts.push(QUERY_PLACEHOLDER.to_string());
        parts.join(" ")
    }
}

enum SessionDir {
    /// Created here and removed on drop
    Owned(TempDir),
    /// Supplied by the caller, who cleans it up
    External(PathBuf),
}

/// Scratch directory and file layout of one interactive session.
pub struct ReloadSession {
    dir: SessionDir,
    pub managers: Vec<KnownManagers>,
    pub transport: Transport,
}

impl ReloadSession {
    pub fn create(root: Option<&Path>, managers: Vec<KnownManagers>, transport: Transport) -> Result<Self> {
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                SessionDir::External(root.to_path_buf())
            }
            None => {
                let base = std::env::temp_dir().join("pkgsift");
                fs::create_dir_all(&base)?;
                SessionDir::Owned(tempfile::Builder::new().prefix("session.").tempdir_in(base)?)
            }
        };
        let session = Self {
            dir,
            managers,
            transport,
        };
        info!("session directory: {}", session.path().display());
        Ok(session)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.dir {
            SessionDir::Owned(dir) => dir.path(),
            SessionDir::External(path) => path,
        }
    }

    pub fn display_file(&self) -> PathBuf {
        self.path().join("display.tsv")
    }

    pub fn help_file(&self) -> PathBuf {
        self.path().join("help.txt")
    }

    pub fn keybind_file(&self) -> PathBuf {
        self.path().join("keybinds.txt")
    }

    pub fn baseline_file(&self) -> PathBuf {
        self.path().join("reload-fallback.tsv")
    }

    pub fn write_rows(&self, path: &Path, rows: &[Candidate]) -> Result<()> {
        fs::write(path, render_rows(rows))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::EnvironmentConfig;
    use crate::data::SearchRow;
    use crate::sources::{BackendQuery, StaticLocator};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASELINE: &str = "brew\tbat\t  cat clone\n";

    struct CountingAdapter {
        calls: AtomicUsize,
    }

    impl PackageAdapter for CountingAdapter {
        fn search<'a>(
            &'a self,
            manager: &'a KnownManagers,
            query: &'a BackendQuery,
        ) -> BoxFuture<'a, Result<Vec<SearchRow>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(match (manager, query.query.as_str()) {
                    (KnownManagers::Brew, "ripgrep") => vec![SearchRow::new("ripgrep", "grep tool")],
                    _ => Vec::new(),
                })
            })
        }

        fn installed<'a>(&'a self, _manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["ripgrep".to_string()])
            })
        }
    }

    struct Harness {
        dir: TempDir,
        adapter: Arc<CountingAdapter>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("baseline.tsv"), BASELINE).unwrap();
            Self {
                dir,
                adapter: Arc::new(CountingAdapter {
                    calls: AtomicUsize::new(0),
                }),
            }
        }

        fn controller(&self, extra: &[(&str, &str)]) -> Result<ReloadController> {
            let baseline = self.dir.path().join("baseline.tsv").display().to_string();
            let cache = self.dir.path().join("cache").display().to_string();
            let mut pairs: Vec<(String, String)> = vec![
                ("RELOAD_FALLBACK_FILE".into(), baseline),
                ("RELOAD_DEBOUNCE_MS".into(), "0".into()),
                ("CACHE_DIR".into(), cache),
            ];
            pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            let settings = PkgsiftSettings::from_env_config(&EnvironmentConfig::from_pairs(pairs));
            ReloadController::new(
                &settings,
                self.adapter.clone(),
                Arc::new(StaticLocator::with(["brew", "snap"])),
            )
        }

        fn calls(&self) -> usize {
            self.adapter.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_short_query_serves_baseline_without_backends() {
        let harness = Harness::new();
        let mut controller = harness.controller(&[("RELOAD_MANAGERS", "brew")]).unwrap();
        assert_eq!(controller.state(), ReloadState::Idle);

        let outcome = controller.handle("r").await;
        assert_eq!(outcome.state, ReloadState::FallbackServed);
        assert_eq!(outcome.output, BASELINE.as_bytes());
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_rows_skip_markers() {
        let harness = Harness::new();
        let mut controller = harness.controller(&[("RELOAD_MANAGERS", "brew")]).unwrap();

        let outcome = controller.handle("ripgrep").await;
        assert_eq!(outcome.state, ReloadState::Served);
        assert_eq!(controller.state(), ReloadState::Served);
        assert_eq!(
            String::from_utf8(outcome.output).unwrap(),
            "brew\tripgrep\t  grep tool\n"
        );
        // one search, no installed lookup
        assert_eq!(harness.calls(), 1);
        assert!(!harness.dir.path().join("cache").join("search").exists());
    }

    #[tokio::test]
    async fn test_unavailable_member_fails_whole_subset() {
        let harness = Harness::new();
        let mut controller = harness
            .controller(&[("RELOAD_MANAGERS", "brew,pacman")])
            .unwrap();
        assert!(controller.resolve_managers().is_err());

        let outcome = controller.handle("ripgrep").await;
        assert_eq!(outcome.state, ReloadState::FallbackServed);
        assert_eq!(outcome.output, BASELINE.as_bytes());
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_override_falls_back() {
        let harness = Harness::new();
        let mut controller = harness
            .controller(&[("RELOAD_MANAGER", "nosuchthing"), ("RELOAD_MANAGERS", "brew")])
            .unwrap();
        let outcome = controller.handle("ripgrep").await;
        assert_eq!(outcome.state, ReloadState::FallbackServed);
    }

    #[tokio::test]
    async fn test_empty_result_falls_back() {
        let harness = Harness::new();
        let mut controller = harness
            .controller(&[("RELOAD_MANAGERS", "brew,snap")])
            .unwrap();
        let outcome = controller.handle("zzzz").await;
        assert_eq!(outcome.state, ReloadState::FallbackServed);
        assert_eq!(outcome.output, BASELINE.as_bytes());
    }

    #[test]
    fn test_missing_fallback_setting_is_config_error() {
        let settings = PkgsiftSettings::from_env_config(&EnvironmentConfig::default());
        let err = ReloadController::new(
            &settings,
            Arc::new(CountingAdapter {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(StaticLocator::default()),
        )
        .err()
        .unwrap();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_reload_command_lines() {
        let command = ReloadCommand {
            exe: PathBuf::from("/usr/local/bin/pkgsift"),
            manager_override: None,
            managers: vec![KnownManagers::Apt, KnownManagers::Brew],
            fallback_file: PathBuf::from("/tmp/session.x/reload-fallback.tsv"),
            bypass_cache: true,
        };

        assert_eq!(
            command.selector_reload(),
            "PKGSIFT_SKIP_INSTALLED_MARKERS=1 PKGSIFT_BYPASS_QUERY_CACHE=1 \
             PKGSIFT_SKIP_QUERY_CACHE_WRITE=1 PKGSIFT_RELOAD_MANAGER='' \
             PKGSIFT_RELOAD_MANAGERS=apt,brew \
             PKGSIFT_RELOAD_FALLBACK_FILE=/tmp/session.x/reload-fallback.tsv \
             /usr/local/bin/pkgsift reload -- {q}"
        );
        assert!(command
            .selector_notify()
            .ends_with("/usr/local/bin/pkgsift notify -- {q}"));
        assert!(command.reload_line_for("foo bar").ends_with("reload -- 'foo bar'"));
    }

    #[test]
    fn test_transport_choice() {
        let listen = SelectorCapabilities {
            listen: true,
            result_bind: true,
        };
        let plain = SelectorCapabilities::default();
        assert_eq!(Transport::choose(TransportPreference::Auto, &listen), Transport::Push);
        assert_eq!(Transport::choose(TransportPreference::Auto, &plain), Transport::Sync);
        assert_eq!(Transport::choose(TransportPreference::Push, &plain), Transport::Sync);
        assert_eq!(Transport::choose(TransportPreference::Sync, &listen), Transport::Sync);
    }

    #[test]
    fn test_owned_session_removed_on_drop() {
        let session = ReloadSession::create(None, vec![KnownManagers::Brew], Transport::Sync).unwrap();
        let path = session.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("session."));
        drop(session);
        assert!(!path.exists());
    }

    #[test]
    fn test_external_session_survives_drop() {
        let root = TempDir::new().unwrap();
        let external = root.path().join("mine");
        let session =
            ReloadSession::create(Some(&external), vec![KnownManagers::Brew], Transport::Push).unwrap();
        session
            .write_rows(&session.display_file(), &[Candidate::new(KnownManagers::Brew, "bat", "  -")])
            .unwrap();
        drop(session);
        assert_eq!(
            fs::read_to_string(external.join("display.tsv")).unwrap(),
            "brew\tbat\t  -\n"
        );
    }
}
