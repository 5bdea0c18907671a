//! Dispatch, merge, annotate, and rank wired together.

use std::sync::Arc;
use std::time::Instant;

use derive_builder::Builder;
use tracing::debug;

use crate::cache::{CacheStore, InstalledIndex};
use crate::configuration::{MarkerMode, MarkerSettings, PkgsiftSettings, RankSettings};
use crate::data::{Candidate, KnownManagers};
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::errors::{PkgsiftError, Result};
use crate::merge::{merge_candidates, Annotator};
use crate::perf;
use crate::rank;
use crate::sources::{CommandLocator, PackageAdapter};

/// One search through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct SearchRequest {
    pub query: String,
    pub managers: Vec<KnownManagers>,
    /// Overrides the configured marker policy
    #[builder(default)]
    pub marker_mode: Option<MarkerMode>,
    /// Per-manager time budgets, for live reload
    #[builder(default)]
    pub timeouts: bool,
}

pub struct SearchPipeline {
    dispatcher: Dispatcher,
    annotator: Annotator,
    markers: MarkerSettings,
    rank: RankSettings,
}

impl SearchPipeline {
    pub fn new(dispatcher: Dispatcher, annotator: Annotator, markers: MarkerSettings, rank: RankSettings) -> Self {
        Self {
            dispatcher,
            annotator,
            markers,
            rank,
        }
    }

    /// Builds every stage from loaded settings.
    pub fn from_settings(
        settings: &PkgsiftSettings,
        adapter: Arc<dyn PackageAdapter>,
        locator: Arc<dyn CommandLocator>,
    ) -> Self {
        let store = CacheStore::new(settings.cache.clone(), locator);
        let index = Arc::new(InstalledIndex::new(store.clone(), adapter.clone()));
        let dispatcher = Dispatcher::new(
            adapter,
            Arc::new(store),
            settings.search.clone(),
            settings.reload.clone(),
        );
        Self::new(
            dispatcher,
            Annotator::new(index),
            settings.markers.clone(),
            settings.rank.clone(),
        )
    }

    /// Ranked, annotated candidates; an empty manager list is an error.
    pub async fn run(&self, request: &SearchRequest) -> Result<Vec<Candidate>> {
        if request.managers.is_empty() {
            return Err(PkgsiftError::NoBackends(
                "no package manager is available for this search".to_string(),
            ));
        }
        let total = Instant::now();
        let query = request.query.trim();

        let started = Instant::now();
        let options = DispatchOptions {
            timeouts: request.timeouts,
        };
        let collected = self.dispatcher.collect(query, &request.managers, &options).await;
        perf::stage("collect", started);
        if collected.is_empty() {
            debug!("no rows from {} managers", request.managers.len());
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let merged = merge_candidates(collected);
        perf::stage("merge", started);

        let started = Instant::now();
        let mode = request
            .marker_mode
            .unwrap_or_else(|| self.markers.mode_for(query, request.managers.len()));
        let marked = self.annotator.annotate(merged, mode).await;
        perf::stage("mark", started);

        let started = Instant::now();
        let ranked = if query.is_empty() {
            marked
        } else {
            rank::rank(query, rank::round_robin_cap(marked, self.rank.budget))
        };
        perf::stage("rank", started);

        let started = Instant::now();
        let limited = rank::apply_result_limit(query, ranked, self.rank.result_limit);
        perf::stage("limit", started);

        perf::stage("total", total);
        debug!("search for '{}' produced {} rows", query, limited.len());
        Ok(limited)
    }
}

/// `manager\tpackage\tdescription` lines, newline terminated.
pub fn render_rows(rows: &[Candidate]) -> String {
    rows.iter().map(|row| format!("{row}\n")).collect()
}
