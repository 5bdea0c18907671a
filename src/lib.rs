//! pkgsift - a fuzzy package finder
//!
//! pkgsift queries every package manager available on the machine in
//! parallel, merges their answers into one list, marks what is already
//! installed, ranks the list against the query, and feeds it to fzf. While
//! the user types, fzf calls back into pkgsift to replace the list live.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pkgsift::pipeline::{render_rows, SearchPipeline, SearchRequest};
//! use pkgsift::sources::{CommandAdapter, SystemLocator};
//! use pkgsift::{KnownManagers, PkgsiftSettings};
//!
//! # async fn example() -> pkgsift::Result<()> {
//! let settings = PkgsiftSettings::load()?;
//! let locator = Arc::new(SystemLocator);
//! let adapter = Arc::new(CommandAdapter::new(locator.clone()));
//! let pipeline = SearchPipeline::from_settings(&settings, adapter, locator);
//!
//! let request = SearchRequest {
//!     query: "ripgrep".to_string(),
//!     managers: vec![KnownManagers::Brew, KnownManagers::Npm],
//!     marker_mode: None,
//!     timeouts: false,
//! };
//! print!("{}", render_rows(&pipeline.run(&request).await?));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Many managers**: apt, dnf, pacman, zypper, emerge, brew, winget, choco,
//!   scoop, snap, flatpak, npm and bun behind one adapter interface
//! - **Concurrent dispatch**: one task per manager, results kept in request order
//! - **Disk cache**: per-manager TTLs, fingerprinted against the manager binary
//! - **Installed markers**: `* ` for installed rows, memoized per process
//! - **Ranking**: exact, prefix and token matches first, noise pushed down
//! - **Live reload**: sync `reload` binds or pushes over fzf's `--listen` endpoint
//!
//! # Architecture
//!
//! - [`dispatch::Dispatcher`]: fans a query out to the adapters
//! - [`cache::CacheStore`] and [`cache::InstalledIndex`]: disk cache and installed memo
//! - [`merge`]: ordering, deduplication, and installed markers
//! - [`rank`]: the scoring that orders results for a query
//! - [`pipeline::SearchPipeline`]: the stages wired together
//! - [`reload`], [`selector`], [`ipc`]: the interactive session around fzf
//!
//! # Error Handling
//!
//! Fallible operations return [`Result<T>`] with [`PkgsiftError`]. Inside the
//! pipeline most failures are absorbed: a backend that errors or times out
//! contributes no rows and the rest of the search goes on.
//!
//! ```rust,no_run
//! use pkgsift::PkgsiftError;
//!
//! fn report(err: &PkgsiftError) {
//!     eprintln!("{} error: {}", err.category(), err);
//! }
//! ```

pub mod cache;
pub mod commands;
pub mod configuration;
pub mod data;
pub mod dispatch;
pub mod errors;
pub mod ipc;
pub mod merge;
pub mod output;
pub mod perf;
pub mod pipeline;
pub mod rank;
pub mod reload;
pub mod selector;
pub mod sources;

// Re-export commonly used types
pub use cache::{CacheStore, InstalledIndex};
pub use configuration::{EnvironmentConfig, PkgsiftSettings};
pub use data::{Candidate, KnownManagers, SearchRow};
pub use errors::{PkgsiftError, Result};
pub use pipeline::{SearchPipeline, SearchRequest};
pub use sources::{CommandAdapter, PackageAdapter};
