//! Backend adapters: the boundary between the search pipeline and the package
//! manager programs it queries.
//!
//! # Architecture
//!
//! - [`PackageAdapter`]: search and installed-set capability, selected by
//!   manager id at the dispatcher boundary
//! - [`CommandAdapter`]: runs the real manager binaries and parses their output
//! - [`CommandLocator`]: resolves executables on `PATH`; its answers decide both
//!   readiness and cache fingerprints
//!
//! # Examples
//!
//! ```rust,no_run
//! use pkgsift::sources::{BackendQuery, CommandAdapter, PackageAdapter};
//! use pkgsift::KnownManagers;
//!
//! # async fn example() -> pkgsift::Result<()> {
//! let adapter = CommandAdapter::default();
//! let query = BackendQuery { query: "ripgrep".into(), limit: 40, aux_limit: 120 };
//! let rows = adapter.search(&KnownManagers::Pacman, &query).await?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::data::{KnownManagers, SearchRow};
use crate::errors::{PkgsiftError, Result};

pub mod parsers;

/// Effective search parameters for one manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendQuery {
    pub query: String,
    /// Rows kept from this manager
    pub limit: usize,
    /// Secondary budget passed through to managers that take one (npm)
    pub aux_limit: usize,
}

/// Search and installed-set capability of a package manager.
pub trait PackageAdapter: Send + Sync {
    /// Ordered `(name, description)` rows for `query`.
    fn search<'a>(
        &'a self,
        manager: &'a KnownManagers,
        query: &'a BackendQuery,
    ) -> BoxFuture<'a, Result<Vec<SearchRow>>>;

    /// Names of installed packages.
    fn installed<'a>(&'a self, manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Resolves executable names to paths.
pub trait CommandLocator: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Looks executables up on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLocator;

impl CommandLocator for SystemLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Fixed name-to-path table, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    paths: HashMap<String, PathBuf>,
}

impl StaticLocator {
    /// Every listed program resolves to `/usr/bin/<name>`.
    pub fn with<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut locator = Self::default();
        for program in programs {
            let program = program.as_ref();
            locator.insert(program, PathBuf::from("/usr/bin").join(program));
        }
        locator
    }

    pub fn insert<P: Into<PathBuf>>(&mut self, program: &str, path: P) {
        self.paths.insert(program.to_string(), path.into());
    }

    pub fn remove(&mut self, program: &str) {
        self.paths.remove(program);
    }
}

impl CommandLocator for StaticLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.paths.get(program).cloned()
    }
}

/// Runs the real package manager binaries.
#[derive(Clone)]
pub struct CommandAdapter {
    locator: Arc<dyn CommandLocator>,
}

impl CommandAdapter {
    pub fn new(locator: Arc<dyn CommandLocator>) -> Self {
        Self { locator }
    }

    async fn run_first_success(&self, invocations: Vec<Vec<String>>) -> Result<String> {
        let mut last_error = None;
        for argv in invocations {
            match self.run_quiet(&argv).await {
                Ok(out) => return Ok(out),
                Err(err) => {
                    trace!("invocation failed, trying next: {}", err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| PkgsiftError::CommandFailed("no command to run".to_string())))
    }

    /// Runs `argv` with stderr discarded; non-zero exit is an error.
    ///
    /// The child is killed if the returned future is dropped, so a dispatcher
    /// timeout never leaves a stray manager process behind.
    async fn run_quiet(&self, argv: &[String]) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PkgsiftError::CommandFailed("empty command".to_string()))?;
        let cmd_display = argv.join(" ");

        let path = self
            .locator
            .locate(program)
            .ok_or_else(|| PkgsiftError::backend(program.as_str(), "executable not found"))?;

        debug!("Running command: {}", cmd_display);
        let output = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PkgsiftError::command_failed(&cmd_display, format!("Process error: {}", e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(PkgsiftError::command_failed(
                &cmd_display,
                format!("exited with {}", output.status),
            ))
        }
    }
}

impl Default for CommandAdapter {
    fn default() -> Self {
        Self::new(Arc::new(SystemLocator))
    }
}

impl PackageAdapter for CommandAdapter {
    fn search<'a>(
        &'a self,
        manager: &'a KnownManagers,
        query: &'a BackendQuery,
    ) -> BoxFuture<'a, Result<Vec<SearchRow>>> {
        Box::pin(async move {
            let invocations = search_invocations(manager, query)?;
            let out = self.run_first_success(invocations).await?;
            Ok(parsers::parse_search(manager, &out))
        })
    }

    fn installed<'a>(&'a self, manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let invocations = installed_invocations(manager)?;
            let out = self.run_first_success(invocations).await?;
            Ok(parsers::parse_installed(manager, &out))
        })
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Command lines to try, in order, for a search.
pub fn search_invocations(manager: &KnownManagers, query: &BackendQuery) -> Result<Vec<Vec<String>>> {
    let q = query.query.as_str();
    let npm_limit = format!("--searchlimit={}", query.aux_limit);

    let invocations = match manager {
        KnownManagers::Apt => vec![argv(&["apt-cache", "search", "--", q])],
        KnownManagers::Dnf => {
            let pattern = if q.is_empty() {
                "*".to_string()
            } else {
                format!("*{q}*")
            };
            vec![argv(&["dnf", "-q", "list", "available", &pattern])]
        }
        KnownManagers::Pacman => vec![argv(&["pacman", "-Ss", "--", q])],
        KnownManagers::Zypper => vec![argv(&[
            "zypper",
            "--non-interactive",
            "--quiet",
            "search",
            "--details",
            "--type",
            "package",
            q,
        ])],
        KnownManagers::Emerge => vec![argv(&["emerge", "--searchdesc", "--color=n", q])],
        KnownManagers::Brew => vec![argv(&["brew", "search", q])],
        KnownManagers::Winget => vec![argv(&[
            "winget",
            "search",
            q,
            "--source",
            "winget",
            "--accept-source-agreements",
            "--disable-interactivity",
        ])],
        KnownManagers::Choco => vec![argv(&["choco", "search", q, "--limit-output"])],
        KnownManagers::Scoop => vec![argv(&["scoop", "search", q])],
        KnownManagers::Snap => vec![argv(&["snap", "find", q])],
        KnownManagers::Flatpak if q.is_empty() => vec![
            argv(&[
                "flatpak",
                "remote-ls",
                "--app",
                "--columns=application,description",
                "flathub",
            ]),
            argv(&["flatpak", "remote-ls", "--app", "--columns=application,description"]),
        ],
        KnownManagers::Flatpak => vec![
            argv(&["flatpak", "search", "--columns=application,description", q]),
            argv(&["flatpak", "search", q]),
        ],
        KnownManagers::Npm => vec![argv(&["npm", "search", q, &npm_limit, "--parseable"])],
        KnownManagers::Bun => vec![argv(&["bun", "search", q])],
        KnownManagers::Unknown(name) => {
            return Err(PkgsiftError::backend(name.as_str(), "unsupported manager"))
        }
    };
    Ok(invocations)
}

/// Command lines to try, in order, to list installed packages.
pub fn installed_invocations(manager: &KnownManagers) -> Result<Vec<Vec<String>>> {
    let invocations = match manager {
        KnownManagers::Apt => vec![argv(&[
            "dpkg-query",
            "-W",
            "-f=${binary:Package}\\t${Version}\\n",
        ])],
        KnownManagers::Dnf => vec![argv(&["dnf", "-q", "list", "installed"])],
        KnownManagers::Pacman => vec![argv(&["pacman", "-Q"])],
        KnownManagers::Zypper => vec![argv(&[
            "zypper",
            "--non-interactive",
            "--quiet",
            "search",
            "--installed-only",
            "--details",
            "--type",
            "package",
        ])],
        KnownManagers::Emerge => vec![argv(&["qlist", "-ICv"])],
        KnownManagers::Brew => vec![argv(&["brew", "list", "--versions"])],
        KnownManagers::Winget => vec![argv(&[
            "winget",
            "list",
            "--source",
            "winget",
            "--accept-source-agreements",
            "--disable-interactivity",
        ])],
        KnownManagers::Choco => vec![argv(&["choco", "list", "--local-only", "--limit-output"])],
        KnownManagers::Scoop => vec![argv(&["scoop", "list"])],
        KnownManagers::Snap => vec![argv(&["snap", "list"])],
        KnownManagers::Flatpak => vec![argv(&[
            "flatpak",
            "list",
            "--app",
            "--columns=application,version",
        ])],
        KnownManagers::Npm => vec![argv(&["npm", "ls", "-g", "--depth=0", "--parseable"])],
        KnownManagers::Bun => vec![argv(&["bun", "pm", "ls", "--global"])],
        KnownManagers::Unknown(name) => {
            return Err(PkgsiftError::backend(name.as_str(), "unsupported manager"))
        }
    };
    Ok(invocations)
}
