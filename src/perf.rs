//! Pipeline stage timings.
//!
//! Events go to the `pkgsift::perf` target at debug level; `PKGSIFT_PERF_TRACE`
//! turns that target on without raising verbosity elsewhere.

use std::time::Instant;

use tracing::debug;

/// Filter directive that enables stage timing events.
pub const PERF_DIRECTIVE: &str = "pkgsift::perf=debug";

pub fn stage(stage: &str, started: Instant) {
    debug!(
        target: "pkgsift::perf",
        stage,
        duration_ms = started.elapsed().as_millis() as u64,
        "perf-trace"
    );
}

pub fn stage_detail(stage: &str, detail: &str, started: Instant) {
    debug!(
        target: "pkgsift::perf",
        stage,
        detail,
        duration_ms = started.elapsed().as_millis() as u64,
        "perf-trace"
    );
}
