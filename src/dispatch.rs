//! Concurrent fan-out of one query to every active package manager.
//!
//! Each manager runs in its own task and reports `(index, rows)` over a
//! channel; rows are reassembled in the caller's manager order no matter which
//! task finishes first. A manager that fails, is missing, or runs out of time
//! contributes zero rows and never fails the whole request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::configuration::{ReloadSettings, SearchSettings};
use crate::data::{Candidate, KnownManagers, SearchRow};
use crate::errors::{PkgsiftError, Result};
use crate::perf;
use crate::sources::{BackendQuery, PackageAdapter};

/// Per-request dispatch switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
pub struct DispatchOptions {
    /// Apply per-manager time budgets (live reload only).
    pub timeouts: bool,
}

/// Fans a query out to the adapter through the search cache.
#[derive(Clone)]
pub struct Dispatcher {
    adapter: Arc<dyn PackageAdapter>,
    cache: Arc<CacheStore>,
    search: Arc<SearchSettings>,
    reload: Arc<ReloadSettings>,
}

impl Dispatcher {
    pub fn new(
        adapter: Arc<dyn PackageAdapter>,
        cache: Arc<CacheStore>,
        search: SearchSettings,
        reload: ReloadSettings,
    ) -> Self {
        Self {
            adapter,
            cache,
            search: Arc::new(search),
            reload: Arc::new(reload),
        }
    }

    /// Candidates from every manager, concatenated in `managers` order.
    pub async fn collect(
        &self,
        query: &str,
        managers: &[KnownManagers],
        options: &DispatchOptions,
    ) -> Vec<Candidate> {
        let active = managers.len();
        let (tx, mut rx) = mpsc::channel::<(usize, Vec<Candidate>)>(active.max(1));

        let mut handles = Vec::with_capacity(active);
        for (index, manager) in managers.iter().cloned().enumerate() {
            let this = self.clone();
            let tx = tx.clone();
            let query = query.to_string();
            let timeout = if options.timeouts {
                self.reload.timeout_for(&manager, active)
            } else {
                None
            };
            let allow_fallback = active == 1 || self.search.bun_npm_fallback;

            handles.push(tokio::spawn(async move {
                let rows = this.collect_one(&manager, &query, timeout, allow_fallback).await;
                let candidates = rows
                    .into_iter()
                    .filter(|row| !row.name.is_empty())
                    .map(|row| Candidate::from_row(&manager, row))
                    .collect();
                // The receiver outlives every sender.
                let _ = tx.send((index, candidates)).await;
            }));
        }
        drop(tx);

        let mut slots: Vec<Vec<Candidate>> = vec![Vec::new(); active];
        while let Some((index, candidates)) = rx.recv().await {
            slots[index] = candidates;
        }

        for handle in handles {
            if let Err(err) = handle.await {
                debug!("search task failed: {}", PkgsiftError::from(err));
            }
        }

        slots.into_iter().flatten().collect()
    }

    async fn collect_one(
        &self,
        manager: &KnownManagers,
        query: &str,
        timeout: Option<Duration>,
        allow_fallback: bool,
    ) -> Vec<SearchRow> {
        let started = Instant::now();
        let plan = self.search.plan_for(manager, query);

        if let Some(rows) = self.cache.get_rows(manager, &plan) {
            perf::stage_detail("search", manager.as_str(), started);
            return rows;
        }

        let rows = match self.search_with_budget(manager, &plan, timeout).await {
            Ok(rows) => {
                let rows = dedupe_and_truncate(rows, plan.limit);
                if let Err(err) = self.cache.put_rows(manager, &plan, &rows) {
                    warn!("could not cache {} results: {}", manager.as_str(), err);
                }
                rows
            }
            Err(err @ PkgsiftError::Timeout { .. }) => {
                debug!("{}", err);
                Vec::new()
            }
            Err(err) => {
                debug!("{} search failed: {}", manager.as_str(), err);
                match manager.fallback_sibling() {
                    Some(sibling) if allow_fallback => self.fallback(manager, &sibling, query).await,
                    _ => Vec::new(),
                }
            }
        };

        perf::stage_detail("search", manager.as_str(), started);
        rows
    }

    async fn search_with_budget(
        &self,
        manager: &KnownManagers,
        plan: &BackendQuery,
        timeout: Option<Duration>,
    ) -> Result<Vec<SearchRow>> {
        match timeout {
            None => self.adapter.search(manager, plan).await,
            Some(limit) => tokio::time::timeout(limit, self.adapter.search(manager, plan))
                .await
                .map_err(|_| PkgsiftError::Timeout {
                    backend: manager.as_str().to_string(),
                    elapsed: limit,
                })?,
        }
    }

    /// Rows from `sibling`, still attributed to `manager` by the caller.
    async fn fallback(&self, manager: &KnownManagers, sibling: &KnownManagers, query: &str) -> Vec<SearchRow> {
        let plan = self.search.plan_for(sibling, query);
        match self.adapter.search(sibling, &plan).await {
            Ok(rows) => {
                debug!(
                    "{} fell back to {} ({} rows)",
                    manager.as_str(),
                    sibling.as_str(),
                    rows.len()
                );
                dedupe_and_truncate(rows, plan.limit)
            }
            Err(err) => {
                debug!("{} fallback to {} failed: {}", manager.as_str(), sibling.as_str(), err);
                Vec::new()
            }
        }
    }
}

/// First row per name wins; a zero limit keeps everything.
pub fn dedupe_and_truncate(rows: Vec<SearchRow>, limit: usize) -> Vec<SearchRow> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<SearchRow> = rows
        .into_iter()
        .filter(|row| !row.name.is_empty() && seen.insert(row.name.clone()))
        .collect();
    if limit > 0 && out.len() > limit {
        out.truncate(limit);
    }
    out
}
