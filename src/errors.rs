//! Error types for pkgsift.
//!
//! Most failures inside the search pipeline are absorbed (a failing backend
//! simply contributes no rows), so these errors mainly surface from the
//! adapter layer, the cache, and the interactive session plumbing.

use std::time::Duration;
use thiserror::Error;

/// The main error type for pkgsift operations.
#[derive(Debug, Error)]
pub enum PkgsiftError {
    /// Configuration-related errors (invalid env values, missing session inputs)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// A backend is unsupported, not installed, or returned unusable output
    #[error("Backend error: {0}")]
    Backend(String),

    /// Command execution failures (non-zero exit, spawn failure)
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// A backend call exceeded its time budget
    #[error("{backend} timed out after {}ms", elapsed.as_millis())]
    Timeout { backend: String, elapsed: Duration },

    /// Cache operation failures
    #[error("Cache operation failed: {0}")]
    Cache(String),

    /// File I/O operation failures
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// The interactive selector could not be started or exited abnormally
    #[error("Selector error: {0}")]
    Selector(String),

    /// Pushing an action to the selector's control endpoint failed
    #[error("IPC error: {0}")]
    Ipc(String),

    /// No usable backend for the request
    #[error("No package manager available: {0}")]
    NoBackends(String),

    /// A search finished but produced no rows
    #[error("No packages found {0}")]
    NoResults(String),

    /// Concurrent task or locking errors
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

/// A type alias for Results that use PkgsiftError.
pub type Result<T> = std::result::Result<T, PkgsiftError>;

impl PkgsiftError {
    /// Creates a new Backend error with context.
    pub fn backend<S1, S2>(backend: S1, msg: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        PkgsiftError::Backend(format!("{}: {}", backend.into(), msg.into()))
    }

    /// Creates a new CommandFailed error with context.
    pub fn command_failed<S1, S2>(cmd: S1, details: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        PkgsiftError::CommandFailed(format!("{}: {}", cmd.into(), details.into()))
    }

    /// Creates a new Cache error with the path that was being touched.
    pub fn cache<S1, S2>(path: S1, msg: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        PkgsiftError::Cache(format!("{}: {}", path.into(), msg.into()))
    }

    /// Returns true if this error represents a transient failure that might be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PkgsiftError::Io(_)
                | PkgsiftError::CommandFailed(_)
                | PkgsiftError::Timeout { .. }
                | PkgsiftError::Ipc(_)
        )
    }

    /// Returns the error category as a string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            PkgsiftError::Config(_) => "config",
            PkgsiftError::Backend(_) => "backend",
            PkgsiftError::CommandFailed(_) => "command_failed",
            PkgsiftError::Timeout { .. } => "timeout",
            PkgsiftError::Cache(_) => "cache",
            PkgsiftError::Io(_) => "io",
            PkgsiftError::Selector(_) => "selector",
            PkgsiftError::Ipc(_) => "ipc",
            PkgsiftError::NoBackends(_) => "no_backends",
            PkgsiftError::NoResults(_) => "no_results",
            PkgsiftError::Concurrency(_) => "concurrency",
        }
    }
}

impl From<tokio::task::JoinError> for PkgsiftError {
    fn from(err: tokio::task::JoinError) -> Self {
        PkgsiftError::Concurrency(format!("Task join error: {}", err))
    }
}

impl From<minreq::Error> for PkgsiftError {
    fn from(err: minreq::Error) -> Self {
        PkgsiftError::Ipc(err.to_string())
    }
}
