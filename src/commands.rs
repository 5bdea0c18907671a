//! Command implementations behind the `pkgsift` binary.
//!
//! # Commands
//!
//! - [`feed_command`]: print ranked rows for a query
//! - [`search_command`]: interactive fzf session, printing the selected rows
//! - [`reload_command`] / [`notify_command`]: hidden entry points the selector
//!   calls back into on every keystroke
//! - [`cache_command`]: inspect, clear, or rebuild the on-disk cache
//! - [`env_command`]: list the supported `PKGSIFT_*` variables
//!
//! Every command takes a [`CommandContext`], which carries the resolved
//! settings plus the adapter and locator the pipeline runs against.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pkgsift::commands::{feed_command, CommandContext};
//! use pkgsift::PkgsiftSettings;
//!
//! # async fn example() -> pkgsift::Result<()> {
//! let ctx = CommandContext::system(PkgsiftSettings::load()?);
//! feed_command(&ctx, Some("brew,npm"), "ripgrep").await?;
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::sync::Arc;

use anyhow::anyhow;
use tabular::{Row, Table};
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, InstalledIndex};
use crate::configuration::{EnvironmentConfig, PkgsiftSettings};
use crate::data::{detect_available_managers, Candidate, KnownManagers};
use crate::errors::{PkgsiftError, Result};
use crate::ipc::{change_list_action, ListenClient};
use crate::output;
use crate::pipeline::{render_rows, SearchPipeline, SearchRequest};
use crate::reload::{ReloadCommand, ReloadController, ReloadSession, Transport};
use crate::selector::{
    header_text, help_text, keybind_text, run_selector, selector_args, ReloadBinding, SelectorCapabilities,
    SelectorOptions,
};
use crate::sources::{CommandAdapter, CommandLocator, PackageAdapter, SystemLocator};

/// Settings and collaborators shared by every command.
#[derive(Clone)]
pub struct CommandContext {
    pub settings: PkgsiftSettings,
    pub adapter: Arc<dyn PackageAdapter>,
    pub locator: Arc<dyn CommandLocator>,
}

impl CommandContext {
    pub fn new(
        settings: PkgsiftSettings,
        adapter: Arc<dyn PackageAdapter>,
        locator: Arc<dyn CommandLocator>,
    ) -> Self {
        Self {
            settings,
            adapter,
            locator,
        }
    }

    /// Real binaries found on `PATH`.
    pub fn system(settings: PkgsiftSettings) -> Self {
        let locator: Arc<dyn CommandLocator> = Arc::new(SystemLocator);
        let adapter: Arc<dyn PackageAdapter> = Arc::new(CommandAdapter::new(locator.clone()));
        Self::new(settings, adapter, locator)
    }

    pub fn pipeline(&self) -> SearchPipeline {
        SearchPipeline::from_settings(&self.settings, self.adapter.clone(), self.locator.clone())
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(self.settings.cache.clone(), self.locator.clone())
    }

    /// Managers for a command: the `-m` list when given, else detection.
    ///
    /// An explicit list must name only supported managers that are installed
    /// here; a bad entry is reported rather than silently dropped.
    pub fn resolve_managers(&self, requested: Option<&str>) -> Result<Vec<KnownManagers>> {
        let requested = requested.map(str::trim).filter(|csv| !csv.is_empty());
        let Some(csv) = requested else {
            let detected = detect_available_managers(self.locator.as_ref(), true);
            if detected.is_empty() {
                return Err(PkgsiftError::NoBackends(
                    "none of the supported package managers were found on PATH".to_string(),
                ));
            }
            debug!("detected managers: {:?}", detected);
            return Ok(detected);
        };

        let managers = KnownManagers::parse_list(csv);
        for manager in &managers {
            if !manager.is_supported() {
                return Err(PkgsiftError::backend(manager.as_str(), "unsupported package manager"));
            }
            if !manager.is_ready(self.locator.as_ref()) {
                return Err(PkgsiftError::backend(
                    manager.label(),
                    format!("missing {}", manager.required_binaries().join(", ")),
                ));
            }
        }
        if managers.is_empty() {
            return Err(PkgsiftError::NoBackends(format!("'{csv}' names no manager")));
        }
        Ok(managers)
    }
}

fn no_results(query: &str, managers: &[KnownManagers]) -> PkgsiftError {
    let labels = crate::selector::join_labels(managers);
    if query.trim().is_empty() {
        PkgsiftError::NoResults(format!("in {labels}"))
    } else {
        PkgsiftError::NoResults(format!("matching '{}' in {labels}", query.trim()))
    }
}

/// Ranked rows for `query`; an empty result is an error.
pub async fn feed_rows(ctx: &CommandContext, requested: Option<&str>, query: &str) -> Result<Vec<Candidate>> {
    let managers = ctx.resolve_managers(requested)?;
    let request = SearchRequest {
        query: query.to_string(),
        managers: managers.clone(),
        marker_mode: None,
        timeouts: false,
    };
    let rows = ctx.pipeline().run(&request).await?;
    if rows.is_empty() {
        return Err(no_results(query, &managers));
    }
    Ok(rows)
}

/// Prints `manager\tpackage\tdescription` rows for `query` to stdout.
pub async fn feed_command(ctx: &CommandContext, requested: Option<&str>, query: &str) -> Result<()> {
    let rows = feed_rows(ctx, requested, query).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(render_rows(&rows).as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Runs an interactive selection and prints the chosen rows.
///
/// The session directory holds the initial list, the help and keybind texts
/// shown in the preview pane, and the baseline reload re-emits whenever it
/// cannot search. When fzf itself fails, the rows are printed instead so the
/// search is not lost.
pub async fn search_command(ctx: &CommandContext, requested: Option<&str>, query: &str) -> Result<()> {
    let settings = &ctx.settings;
    let managers = ctx.resolve_managers(requested)?;
    let fzf = which::which("fzf")
        .map_err(|_| PkgsiftError::Selector("fzf is required for search; try `pkgsift feed`".to_string()))?;

    let caps = SelectorCapabilities::probe(&fzf).await;
    let reload_enabled = settings.reload.mode.enabled_for(managers.len());
    let transport = Transport::choose(settings.reload.transport, &caps);
    let session = ReloadSession::create(settings.reload.session_root.as_deref(), managers.clone(), transport)?;

    let pipeline = ctx.pipeline();
    let request = SearchRequest {
        query: query.to_string(),
        managers: managers.clone(),
        marker_mode: None,
        timeouts: false,
    };
    let rows = pipeline.run(&request).await?;
    if rows.is_empty() && !reload_enabled {
        return Err(no_results(query, &managers));
    }

    session.write_rows(&session.display_file(), &rows)?;
    std::fs::write(session.help_file(), help_text(&managers))?;
    std::fs::write(session.keybind_file(), keybind_text())?;

    let binding = if reload_enabled {
        write_baseline(&pipeline, &session, query, &rows).await?;
        let command = ReloadCommand {
            exe: std::env::current_exe()?,
            manager_override: match managers.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            },
            managers: managers.clone(),
            fallback_file: session.baseline_file(),
            bypass_cache: settings.reload.bypass_query_cache,
        };
        match session.transport {
            Transport::Sync => ReloadBinding::Sync {
                reload: command.selector_reload(),
            },
            Transport::Push => ReloadBinding::Push {
                reload: command.selector_reload(),
                notify: command.selector_notify(),
            },
        }
    } else {
        ReloadBinding::None
    };
    info!("reload: {:?} over {:?}", reload_enabled, session.transport);

    let options = SelectorOptions {
        query: query.to_string(),
        header: header_text(&managers),
        help_file: session.help_file(),
        keybind_file: session.keybind_file(),
        binding,
    };
    let args = selector_args(&options, &caps);

    match run_selector(&fzf, &args, &session.display_file()).await {
        Ok(Some(selected)) => {
            let mut stdout = std::io::stdout().lock();
            for line in selected.lines().filter(|line| !line.trim().is_empty()) {
                writeln!(stdout, "{line}")?;
            }
            stdout.flush()?;
            Ok(())
        }
        Ok(None) => {
            output::info("Selection canceled");
            Ok(())
        }
        Err(err) => {
            output::error(&format!("{err}; printing results instead"));
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(render_rows(&rows).as_bytes())?;
            stdout.flush()?;
            Err(err)
        }
    }
}

/// Reload re-emits this file whenever it cannot search. With a query, it is
/// the unfiltered listing so that clearing the query restores something
/// broader than the first results.
async fn write_baseline(
    pipeline: &SearchPipeline,
    session: &ReloadSession,
    query: &str,
    rows: &[Candidate],
) -> Result<()> {
    if query.trim().is_empty() {
        return session.write_rows(&session.baseline_file(), rows);
    }
    let listing = SearchRequest {
        query: String::new(),
        managers: session.managers.clone(),
        marker_mode: None,
        timeouts: false,
    };
    match pipeline.run(&listing).await {
        Ok(baseline) if !baseline.is_empty() => session.write_rows(&session.baseline_file(), &baseline),
        Ok(_) => session.write_rows(&session.baseline_file(), rows),
        Err(err) => {
            warn!("could not build reload baseline: {}", err);
            session.write_rows(&session.baseline_file(), rows)
        }
    }
}

/// Serves one live-reload request; stdout receives the replacement list.
pub async fn reload_command(ctx: &CommandContext, query: &str) -> Result<()> {
    let mut controller = ReloadController::new(&ctx.settings, ctx.adapter.clone(), ctx.locator.clone())?;
    let outcome = controller.handle(query).await;
    debug!("reload for '{}' ended in {:?}", query, outcome.state);

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.output)?;
    stdout.flush()?;
    Ok(())
}

/// Pushes a reload for `query` to the selector that spawned this process.
pub async fn notify_command(ctx: &CommandContext, query: &str) -> Result<()> {
    let reload = &ctx.settings.reload;
    let fallback_file = reload
        .fallback_file
        .clone()
        .ok_or_else(|| anyhow!("PKGSIFT_RELOAD_FALLBACK_FILE is required for notify"))?;
    let command = ReloadCommand {
        exe: std::env::current_exe()?,
        manager_override: reload.manager_override.clone(),
        managers: reload.managers.clone(),
        fallback_file,
        bypass_cache: reload.bypass_query_cache,
    };
    let action = change_list_action(&command.reload_line_for(query.trim()));

    let port = std::env::var("FZF_PORT").unwrap_or_default();
    let client = ListenClient::new(&port)?;
    tokio::task::spawn_blocking(move || client.send(&action)).await??;
    Ok(())
}

/// `pkgsift cache` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Stats,
    Clear,
    Refresh,
}

pub async fn cache_command(ctx: &CommandContext, action: CacheAction, requested: Option<&str>) -> Result<()> {
    let store = ctx.cache_store();
    match action {
        CacheAction::Stats => {
            println!("{}", output::dim(&store.root().display().to_string()));
            println!("{}", stats_table(&store)?);
        }
        CacheAction::Clear => {
            let removed = store.clear()?;
            output::success(&format!("Removed {removed} cache entries"));
        }
        CacheAction::Refresh => {
            let managers = ctx.resolve_managers(requested)?;
            let refreshed = refresh_installed(store, ctx.adapter.clone(), &managers).await;
            for (manager, result) in managers.iter().zip(refreshed) {
                let name = output::manager_name(manager.label());
                match result {
                    Ok(count) => output::success(&format!("{name}: {count} installed packages")),
                    Err(err) => output::warning(&format!("{name}: {err}")),
                }
            }
        }
    }
    Ok(())
}

/// Rebuilds every installed set concurrently and waits for all of them.
pub async fn refresh_installed(
    store: CacheStore,
    adapter: Arc<dyn PackageAdapter>,
    managers: &[KnownManagers],
) -> Vec<Result<usize>> {
    let index = Arc::new(InstalledIndex::new(store, adapter));
    let handles: Vec<_> = managers
        .iter()
        .map(|manager| index.spawn_refresh(manager.clone()))
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        });
    }
    results
}

/// Per-namespace entry counts and sizes.
pub fn stats_table(store: &CacheStore) -> Result<Table> {
    let mut table = Table::new("{:<}  {:>}  {:>}");
    table.add_row(Row::new().with_cell("namespace").with_cell("entries").with_cell("size"));
    for stats in store.stats()? {
        table.add_row(
            Row::new()
                .with_cell(&stats.namespace)
                .with_cell(stats.entries)
                .with_cell(output::format_bytes(stats.bytes)),
        );
    }
    Ok(table)
}

pub fn env_command() -> Result<()> {
    EnvironmentConfig::from_env()?.print_env_help();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SearchRow;
    use crate::sources::{BackendQuery, StaticLocator};
    use futures::future::BoxFuture;
    use tempfile::TempDir;

    struct FixtureAdapter;

    impl PackageAdapter for FixtureAdapter {
        fn search<'a>(
            &'a self,
            manager: &'a KnownManagers,
            query: &'a BackendQuery,
        ) -> BoxFuture<'a, Result<Vec<SearchRow>>> {
            Box::pin(async move {
                if query.query == "zzz" {
                    return Ok(Vec::new());
                }
                Ok(match manager {
                    KnownManagers::Brew => vec![SearchRow::new("bat", "cat clone")],
                    KnownManagers::Snap => vec![SearchRow::new("bat", "")],
                    _ => Vec::new(),
                })
            })
        }

        fn installed<'a>(&'a self, manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>> {
            Box::pin(async move {
                match manager {
                    KnownManagers::Brew => Ok(vec!["bat".to_string(), "fd".to_string()]),
                    other => Err(PkgsiftError::backend(other.as_str(), "listing failed")),
                }
            })
        }
    }

    fn context(dir: &TempDir) -> CommandContext {
        let mut settings = PkgsiftSettings::default();
        settings.cache.root = dir.path().to_path_buf();
        CommandContext::new(
            settings,
            Arc::new(FixtureAdapter),
            Arc::new(StaticLocator::with(["brew", "snap"])),
        )
    }

    #[test]
    fn test_resolve_requested_managers() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert_eq!(
            ctx.resolve_managers(Some("homebrew, snap")).unwrap(),
            vec![KnownManagers::Brew, KnownManagers::Snap]
        );
        assert_eq!(ctx.resolve_managers(Some("apt")).unwrap_err().category(), "backend");
        assert_eq!(ctx.resolve_managers(Some("nosuch")).unwrap_err().category(), "backend");
        assert_eq!(ctx.resolve_managers(Some(" , ")).unwrap_err().category(), "no_backends");
        assert_eq!(ctx.resolve_managers(Some("")).unwrap(), ctx.resolve_managers(None).unwrap());
    }

    #[test]
    fn test_detection_without_managers_fails() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.locator = Arc::new(StaticLocator::default());
        let err = ctx.resolve_managers(None).unwrap_err();
        assert!(matches!(err, PkgsiftError::NoBackends(_)));
    }

    #[tokio::test]
    async fn test_feed_rows() {
        let dir = TempDir::new().unwrap();
        let rows = feed_rows(&context(&dir), Some("brew,snap"), "bat").await.unwrap();
        assert_eq!(
            render_rows(&rows),
            "brew\tbat\t* cat clone\nsnap\tbat\t  -\n"
        );
    }

    #[tokio::test]
    async fn test_feed_without_rows_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = feed_rows(&context(&dir), Some("brew"), "zzz").await.unwrap_err();
        assert_eq!(err.category(), "no_results");
        assert_eq!(err.to_string(), "No packages found matching 'zzz' in Homebrew");
    }

    #[tokio::test]
    async fn test_refresh_reports_each_manager() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let results = refresh_installed(
            ctx.cache_store(),
            ctx.adapter.clone(),
            &[KnownManagers::Brew, KnownManagers::Snap],
        )
        .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &2);
        assert!(results[1].is_err());

        let table = stats_table(&ctx.cache_store()).unwrap().to_string();
        assert!(table.contains("installed"));
        assert!(table.contains("search"));
    }

    #[tokio::test]
    async fn test_reload_requires_fallback_file() {
        let dir = TempDir::new().unwrap();
        let err = reload_command(&context(&dir), "bat").await.unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
