//! Deduplication of dispatcher output and installed-status annotation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::trace;

use crate::cache::InstalledIndex;
use crate::configuration::MarkerMode;
use crate::data::{Candidate, KnownManagers, EMPTY_DESCRIPTION};

pub const INSTALLED_MARKER: &str = "* ";
pub const NEUTRAL_MARKER: &str = "  ";

/// Sorts by `(manager, package, description)` and keeps the first row for
/// each `(manager, package)`, so the surviving description never depends on
/// which manager answered first.
pub fn merge_candidates(mut rows: Vec<Candidate>) -> Vec<Candidate> {
    rows.sort_by(|a, b| {
        a.manager
            .as_str()
            .cmp(b.manager.as_str())
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.description.cmp(&b.description))
    });

    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(rows.len());
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        if row.manager.as_str().is_empty() || row.package.is_empty() {
            continue;
        }
        if !seen.insert((row.manager.as_str().to_string(), row.package.clone())) {
            continue;
        }
        if row.description.is_empty() {
            row.description = EMPTY_DESCRIPTION.to_string();
        }
        out.push(row);
    }
    out
}

/// Prefixes every description with `* ` or two spaces.
pub struct Annotator {
    index: Arc<InstalledIndex>,
}

impl Annotator {
    pub fn new(index: Arc<InstalledIndex>) -> Self {
        Self { index }
    }

    pub async fn annotate(&self, rows: Vec<Candidate>, mode: MarkerMode) -> Vec<Candidate> {
        match mode {
            MarkerMode::Skip => rows
                .into_iter()
                .map(|row| with_marker(row, NEUTRAL_MARKER))
                .collect(),
            MarkerMode::Lookup => {
                let installed = self.installed_sets(&rows).await;
                rows.into_iter()
                    .map(|row| {
                        let marked = installed
                            .get(&row.manager)
                            .is_some_and(|set| set.contains(&row.package));
                        let marker = if marked { INSTALLED_MARKER } else { NEUTRAL_MARKER };
                        with_marker(row, marker)
                    })
                    .collect()
            }
        }
    }

    async fn installed_sets(&self, rows: &[Candidate]) -> HashMap<KnownManagers, Arc<HashSet<String>>> {
        let mut managers: Vec<KnownManagers> = Vec::new();
        for row in rows {
            if !managers.contains(&row.manager) {
                managers.push(row.manager.clone());
            }
        }
        trace!("looking up installed sets for {} managers", managers.len());

        let lookups = managers.iter().map(|manager| self.index.installed(manager));
        let sets = join_all(lookups).await;
        managers.into_iter().zip(sets).collect()
    }
}

fn with_marker(mut row: Candidate, marker: &str) -> Candidate {
    row.description = format!("{marker}{}", row.description);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::configuration::CacheSettings;
    use crate::data::SearchRow;
    use crate::errors::Result;
    use crate::sources::{BackendQuery, PackageAdapter, StaticLocator};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn candidate(manager: KnownManagers, package: &str, desc: &str) -> Candidate {
        Candidate::new(manager, package, desc)
    }

    struct InstalledFixture {
        calls: AtomicUsize,
    }

    impl PackageAdapter for InstalledFixture {
        fn search<'a>(
            &'a self,
            _manager: &'a KnownManagers,
            _query: &'a BackendQuery,
        ) -> BoxFuture<'a, Result<Vec<SearchRow>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn installed<'a>(&'a self, manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match manager {
                    KnownManagers::Brew => Ok(vec!["ripgrep".to_string()]),
                    _ => Ok(Vec::new()),
                }
            })
        }
    }

    fn annotator(root: &std::path::Path) -> (Annotator, Arc<InstalledFixture>) {
        let adapter = Arc::new(InstalledFixture {
            calls: AtomicUsize::new(0),
        });
        let mut settings = CacheSettings::with_root(root);
        settings.installed_cache_enabled = false;
        let store = CacheStore::new(settings, Arc::new(StaticLocator::with(["brew", "snap"])));
        let index = Arc::new(InstalledIndex::new(store, adapter.clone()));
        (Annotator::new(index), adapter)
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = vec![
            candidate(KnownManagers::Snap, "rg", "zeta"),
            candidate(KnownManagers::Brew, "rg", "x"),
            candidate(KnownManagers::Snap, "rg", "alpha"),
        ];
        let mut b = a.clone();
        b.reverse();

        let merged = merge_candidates(a);
        assert_eq!(merged, merge_candidates(b));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].manager, KnownManagers::Brew);
        assert_eq!(merged[1].description, "alpha");
    }

    #[test]
    fn test_merge_drops_nameless_rows() {
        let merged = merge_candidates(vec![
            candidate(KnownManagers::Brew, "", "orphan"),
            candidate(KnownManagers::Brew, "bat", ""),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, EMPTY_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_skip_mode_prefixes_two_spaces() {
        let dir = TempDir::new().unwrap();
        let (annotator, adapter) = annotator(dir.path());
        let rows = vec![
            candidate(KnownManagers::Brew, "ripgrep", "grep"),
            candidate(KnownManagers::Snap, "code", "-"),
        ];
        let out = annotator.annotate(rows, MarkerMode::Skip).await;
        assert!(out.iter().all(|row| row.description.starts_with("  ")));
        assert_eq!(out[0].description, "  grep");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_marks_installed_once_per_manager() {
        let dir = TempDir::new().unwrap();
        let (annotator, adapter) = annotator(dir.path());
        let rows = vec![
            candidate(KnownManagers::Brew, "ripgrep", "grep"),
            candidate(KnownManagers::Brew, "fd", "find"),
            candidate(KnownManagers::Snap, "ripgrep", "grep"),
        ];
        let out = annotator.annotate(rows, MarkerMode::Lookup).await;
        assert_eq!(out[0].description, "* grep");
        assert_eq!(out[1].description, "  find");
        assert_eq!(out[2].description, "  grep");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }
}
