//! Fingerprinted TTL cache for search rows and installed-package sets.
//!
//! Entries live on disk under a single root shared by every session:
//!
//! ```text
//! <root>/search/<manager>/<key>.tsv     name<TAB>description per line
//! <root>/search/<manager>/<key>.meta
//! <root>/installed/<manager>.txt        sorted names, one per line
//! <root>/installed/<manager>.meta
//! ```
//!
//! The `.meta` sidecar holds `key=value` lines (`format_version`,
//! `created_at`, `created_epoch`, `fingerprint`, `item_count`). An entry is only
//! trusted while it is younger than its TTL and its fingerprint still matches:
//! the fingerprint covers the resolved path of the manager's executable, so
//! installing, moving, or removing the binary invalidates everything it wrote.
//!
//! Every file is written to a temp file in the target directory and renamed
//! into place, so concurrent readers never see a partial entry. Anything
//! missing, malformed, stale, or mismatched reads as a miss.
//!
//! [`InstalledIndex`] sits in front of the installed namespace as an explicitly
//! owned in-memory memo with invalidation and observable background refresh.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use moka::sync::Cache;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::configuration::CacheSettings;
use crate::data::{KnownManagers, SearchRow, EMPTY_DESCRIPTION};
use crate::errors::{PkgsiftError, Result};
use crate::sources::{BackendQuery, CommandLocator, PackageAdapter};

/// Version written to every `.meta` file; other versions read as a miss.
pub const FORMAT_VERSION: u32 = 1;

const SEARCH_NAMESPACE: &str = "search";
const INSTALLED_NAMESPACE: &str = "installed";
const KEY_SCHEMA: &str = "v2";
const FINGERPRINT_SCHEMA: &str = "2";

/// Source of "now" for TTL checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Parsed `.meta` sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetadata {
    pub format_version: u32,
    pub created_at: String,
    pub created_epoch: i64,
    pub fingerprint: String,
    pub item_count: usize,
}

impl CacheMetadata {
    fn new(created: DateTime<Utc>, fingerprint: String, item_count: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: created.to_rfc3339_opts(SecondsFormat::Secs, true),
            created_epoch: created.timestamp(),
            fingerprint,
            item_count,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "format_version={}\ncreated_at={}\ncreated_epoch={}\nfingerprint={}\nitem_count={}\n",
            self.format_version, self.created_at, self.created_epoch, self.fingerprint, self.item_count
        )
    }

    /// `None` when a required field is missing or unparsable.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut format_version = None;
        let mut created_at = String::new();
        let mut created_epoch = None;
        let mut fingerprint = None;
        let mut item_count = 0;

        for line in raw.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "format_version" => format_version = value.parse().ok(),
                "created_at" => created_at = value.to_string(),
                "created_epoch" => created_epoch = value.parse().ok(),
                "fingerprint" if !value.is_empty() => fingerprint = Some(value.to_string()),
                "item_count" => item_count = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        Some(Self {
            format_version: format_version?,
            created_at,
            created_epoch: created_epoch?,
            fingerprint: fingerprint?,
            item_count,
        })
    }
}

/// Entry counts for one cache namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceStats {
    pub namespace: String,
    pub entries: usize,
    pub bytes: u64,
}

/// On-disk cache shared by every pkgsift process.
#[derive(Clone)]
pub struct CacheStore {
    settings: CacheSettings,
    locator: Arc<dyn CommandLocator>,
    clock: Clock,
}

impl CacheStore {
    pub fn new(settings: CacheSettings, locator: Arc<dyn CommandLocator>) -> Self {
        Self {
            settings,
            locator,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used for TTL checks and timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Deterministic entry key for a search.
    #[must_use]
    pub fn search_key(manager: &KnownManagers, plan: &BackendQuery) -> String {
        let material = format!(
            "{KEY_SCHEMA}|ns={SEARCH_NAMESPACE}|mgr={}|q={}|limit={}|aux={}",
            manager.as_str(),
            plan.query,
            plan.limit,
            plan.aux_limit
        );
        format!("{:016x}", xxh3_64(material.as_bytes()))
    }

    fn binary_identity(&self, manager: &KnownManagers) -> String {
        self.locator
            .locate(manager.fingerprint_command())
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "missing".to_string())
    }

    fn search_fingerprint(&self, manager: &KnownManagers, plan: &BackendQuery) -> String {
        let material = format!(
            "{FINGERPRINT_SCHEMA}|{}|{}|q={}|limit={}|aux={}",
            manager.as_str(),
            self.binary_identity(manager),
            plan.query,
            plan.limit,
            plan.aux_limit
        );
        format!("{:016x}", xxh3_64(material.as_bytes()))
    }

    fn installed_fingerprint(&self, manager: &KnownManagers) -> String {
        let material = format!(
            "{FINGERPRINT_SCHEMA}|{INSTALLED_NAMESPACE}|{}|{}",
            manager.as_str(),
            self.binary_identity(manager)
        );
        format!("{:016x}", xxh3_64(material.as_bytes()))
    }

    fn search_paths(&self, manager: &KnownManagers, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.root().join(SEARCH_NAMESPACE).join(manager.as_str());
        (dir.join(format!("{key}.tsv")), dir.join(format!("{key}.meta")))
    }

    fn installed_paths(&self, manager: &KnownManagers) -> (PathBuf, PathBuf) {
        let dir = self.root().join(INSTALLED_NAMESPACE);
        let name = manager.as_str();
        (dir.join(format!("{name}.txt")), dir.join(format!("{name}.meta")))
    }

    /// Cached search rows, or `None` on any kind of miss.
    pub fn get_rows(&self, manager: &KnownManagers, plan: &BackendQuery) -> Option<Vec<SearchRow>> {
        if !self.settings.query_reads_enabled(manager) {
            return None;
        }
        let key = Self::search_key(manager, plan);
        let (data_path, meta_path) = self.search_paths(manager, &key);
        let fingerprint = self.search_fingerprint(manager, plan);
        let payload = self.read_entry(
            &data_path,
            &meta_path,
            self.settings.query_ttl(manager),
            &fingerprint,
        )?;

        let rows: Vec<SearchRow> = payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match line.split_once('\t') {
                Some((name, desc)) if !desc.trim().is_empty() => SearchRow::new(name, desc),
                Some((name, _)) => SearchRow::new(name, EMPTY_DESCRIPTION),
                None => SearchRow::new(line, EMPTY_DESCRIPTION),
            })
            .collect();

        if rows.is_empty() {
            return None;
        }
        debug!("search cache hit for {} ({} rows)", manager.as_str(), rows.len());
        Some(rows)
    }

    /// Stores search rows; returns whether anything was written.
    pub fn put_rows(&self, manager: &KnownManagers, plan: &BackendQuery, rows: &[SearchRow]) -> Result<bool> {
        if rows.is_empty() || !self.settings.query_writes_enabled(manager) {
            return Ok(false);
        }
        let key = Self::search_key(manager, plan);
        let (data_path, meta_path) = self.search_paths(manager, &key);
        let payload: String = rows
            .iter()
            .map(|row| format!("{}\t{}\n", row.name, row.description))
            .collect();
        let fingerprint = self.search_fingerprint(manager, plan);
        self.write_entry(&data_path, &meta_path, &payload, fingerprint, rows.len())?;
        Ok(true)
    }

    /// Cached installed names, or `None` on any kind of miss.
    pub fn get_names(&self, manager: &KnownManagers) -> Option<Vec<String>> {
        if !self.installed_enabled() {
            return None;
        }
        let (data_path, meta_path) = self.installed_paths(manager);
        let fingerprint = self.installed_fingerprint(manager);
        let payload = self.read_entry(&data_path, &meta_path, self.settings.installed_ttl, &fingerprint)?;
        let names: Vec<String> = payload
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        (!names.is_empty()).then_some(names)
    }

    /// Stores installed names sorted and deduplicated.
    pub fn put_names(&self, manager: &KnownManagers, names: &[String]) -> Result<bool> {
        if names.is_empty() || !self.installed_enabled() {
            return Ok(false);
        }
        let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let (data_path, meta_path) = self.installed_paths(manager);
        let payload: String = sorted.iter().map(|name| format!("{name}\n")).collect();
        let fingerprint = self.installed_fingerprint(manager);
        self.write_entry(&data_path, &meta_path, &payload, fingerprint, sorted.len())?;
        Ok(true)
    }

    fn installed_enabled(&self) -> bool {
        self.settings.installed_cache_enabled && !self.settings.installed_ttl.is_zero()
    }

    fn read_entry(&self, data_path: &Path, meta_path: &Path, ttl: Duration, fingerprint: &str) -> Option<String> {
        if ttl.is_zero() {
            return None;
        }

        let raw_meta = fs::read_to_string(meta_path).ok()?;
        let Some(meta) = CacheMetadata::parse(&raw_meta) else {
            debug!("malformed cache metadata: {}", meta_path.display());
            return None;
        };
        if meta.format_version != FORMAT_VERSION {
            debug!("cache format {} unsupported: {}", meta.format_version, meta_path.display());
            return None;
        }

        let age = (self.clock)().timestamp() - meta.created_epoch;
        if age >= ttl.as_secs() as i64 {
            trace!("cache entry expired ({}s old): {}", age, data_path.display());
            return None;
        }
        if meta.fingerprint != fingerprint {
            debug!("cache fingerprint changed: {}", data_path.display());
            return None;
        }

        fs::read_to_string(data_path).ok()
    }

    fn write_entry(
        &self,
        data_path: &Path,
        meta_path: &Path,
        payload: &str,
        fingerprint: String,
        item_count: usize,
    ) -> Result<()> {
        let meta = CacheMetadata::new((self.clock)(), fingerprint, item_count);
        atomic_write(data_path, payload.as_bytes())?;
        atomic_write(meta_path, meta.render().as_bytes())?;
        trace!("cache entry written: {}", data_path.display());
        Ok(())
    }

    /// Entry counts and sizes per namespace.
    pub fn stats(&self) -> Result<Vec<NamespaceStats>> {
        let mut out = Vec::new();
        for namespace in [SEARCH_NAMESPACE, INSTALLED_NAMESPACE] {
            let mut stats = NamespaceStats {
                namespace: namespace.to_string(),
                ..Default::default()
            };
            collect_stats(&self.root().join(namespace), &mut stats)?;
            out.push(stats);
        }
        Ok(out)
    }

    /// Deletes every entry; returns how many entries were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.stats()?.iter().map(|stats| stats.entries).sum();
        for namespace in [SEARCH_NAMESPACE, INSTALLED_NAMESPACE] {
            let dir = self.root().join(namespace);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        debug!("cleared {} cache entries under {}", removed, self.root().display());
        Ok(removed)
    }
}

fn collect_stats(dir: &Path, stats: &mut NamespaceStats) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_stats(&path, stats)?;
            continue;
        }
        let is_data = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("tsv") | Some("txt")
        );
        stats.bytes += entry.metadata()?.len();
        if is_data {
            stats.entries += 1;
        }
    }
    Ok(())
}

/// Write `contents` to a temp file beside `path`, then rename it over `path`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PkgsiftError::cache(path.display().to_string(), "no parent directory"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| PkgsiftError::cache(path.display().to_string(), e.error.to_string()))?;
    Ok(())
}

/// In-memory memo of installed sets, layered over the disk cache.
///
/// Owned by whoever builds the pipeline. Lookups go memo, then disk, then the
/// adapter; a failed lookup yields an empty set and is not memoized.
pub struct InstalledIndex {
    memo: Cache<KnownManagers, Arc<HashSet<String>>>,
    store: CacheStore,
    adapter: Arc<dyn PackageAdapter>,
}

impl InstalledIndex {
    pub fn new(store: CacheStore, adapter: Arc<dyn PackageAdapter>) -> Self {
        let ttl = if store.settings().installed_ttl.is_zero() {
            Duration::from_secs(1)
        } else {
            store.settings().installed_ttl
        };
        let memo = Cache::builder()
            .max_capacity(64)
            .time_to_live(ttl)
            .eviction_listener(|key: Arc<KnownManagers>, _value, cause| {
                trace!("installed set for '{}' removed: {:?}", key.as_str(), cause);
            })
            .build();
        Self {
            memo,
            store,
            adapter,
        }
    }

    /// Installed names for `manager`.
    pub async fn installed(&self, manager: &KnownManagers) -> Arc<HashSet<String>> {
        if let Some(set) = self.memo.get(manager) {
            return set;
        }

        if let Some(names) = self.store.get_names(manager) {
            let set = Arc::new(names.into_iter().collect::<HashSet<_>>());
            self.memo.insert(manager.clone(), set.clone());
            return set;
        }

        match self.fetch(manager).await {
            Ok(set) => set,
            Err(err) => {
                debug!("installed lookup for {} failed: {}", manager.as_str(), err);
                Arc::new(HashSet::new())
            }
        }
    }

    async fn fetch(&self, manager: &KnownManagers) -> Result<Arc<HashSet<String>>> {
        let names = self.adapter.installed(manager).await?;
        if let Err(err) = self.store.put_names(manager, &names) {
            warn!("could not cache installed set for {}: {}", manager.as_str(), err);
        }
        let set = Arc::new(names.into_iter().collect::<HashSet<_>>());
        self.memo.insert(manager.clone(), set.clone());
        Ok(set)
    }

    pub fn invalidate(&self, manager: &KnownManagers) {
        self.memo.invalidate(manager);
    }

    /// Rebuilds one installed set from the adapter in a background task.
    ///
    /// The memo entry is dropped first; the returned handle resolves to the
    /// number of installed names once disk and memo are both updated.
    pub fn spawn_refresh(self: &Arc<Self>, manager: KnownManagers) -> JoinHandle<Result<usize>> {
        let index = Arc::clone(self);
        index.invalidate(&manager);
        tokio::spawn(async move {
            let set = index.fetch(&manager).await?;
            debug!("refreshed installed set for {} ({} names)", manager.as_str(), set.len());
            Ok(set.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticLocator;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const T0: i64 = 1_760_000_000;

    fn clock_at(epoch: i64) -> Clock {
        Arc::new(move || DateTime::from_timestamp(epoch, 0).expect("valid timestamp"))
    }

    fn store(root: &Path, locator: StaticLocator, epoch: i64) -> CacheStore {
        CacheStore::new(CacheSettings::with_root(root), Arc::new(locator)).with_clock(clock_at(epoch))
    }

    fn apt_locator() -> StaticLocator {
        StaticLocator::with(["apt-cache", "apt-get", "dpkg-query"])
    }

    fn plan(query: &str) -> BackendQuery {
        BackendQuery {
            query: query.to_string(),
            limit: 40,
            aux_limit: 120,
        }
    }

    fn rows() -> Vec<SearchRow> {
        vec![
            SearchRow::new("ripgrep", "recursive grep"),
            SearchRow::new("ripgrep-all", ""),
        ]
    }

    #[test]
    fn test_metadata_render_parse() {
        let meta = CacheMetadata::new(
            DateTime::from_timestamp(T0, 0).expect("valid timestamp"),
            "abc".to_string(),
            3,
        );
        let parsed = CacheMetadata::parse(&meta.render()).expect("parsable");
        assert_eq!(parsed, meta);
        assert!(parsed.created_at.ends_with('Z'));
    }

    #[test]
    fn test_metadata_missing_fingerprint_is_rejected() {
        assert!(CacheMetadata::parse("format_version=1\ncreated_epoch=5\n").is_none());
        assert!(CacheMetadata::parse("garbage").is_none());
    }

    #[test]
    fn test_search_key_is_deterministic() {
        let a = CacheStore::search_key(&KnownManagers::Apt, &plan("rg"));
        let b = CacheStore::search_key(&KnownManagers::Apt, &plan("rg"));
        let c = CacheStore::search_key(&KnownManagers::Brew, &plan("rg"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_hit_until_ttl_elapses() {
        let dir = TempDir::new().unwrap();
        let writer = store(dir.path(), apt_locator(), T0);
        assert!(writer.put_rows(&KnownManagers::Apt, &plan("ripgrep"), &rows()).unwrap());

        // apt keeps query results for 180 seconds
        let fresh = store(dir.path(), apt_locator(), T0 + 179);
        let cached = fresh.get_rows(&KnownManagers::Apt, &plan("ripgrep")).expect("hit");
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[1].description, EMPTY_DESCRIPTION);

        let expired = store(dir.path(), apt_locator(), T0 + 180);
        assert!(expired.get_rows(&KnownManagers::Apt, &plan("ripgrep")).is_none());
    }

    #[test]
    fn test_binary_move_invalidates_entry() {
        let dir = TempDir::new().unwrap();
        let writer = store(dir.path(), apt_locator(), T0);
        writer.put_rows(&KnownManagers::Apt, &plan("ripgrep"), &rows()).unwrap();

        let mut moved = apt_locator();
        moved.insert("apt-cache", "/opt/apt/bin/apt-cache");
        let reader = store(dir.path(), moved, T0 + 1);
        assert!(reader.get_rows(&KnownManagers::Apt, &plan("ripgrep")).is_none());

        let mut missing = apt_locator();
        missing.remove("apt-cache");
        let reader = store(dir.path(), missing, T0 + 1);
        assert!(reader.get_rows(&KnownManagers::Apt, &plan("ripgrep")).is_none());
    }

    #[test]
    fn test_different_limit_is_a_different_entry() {
        let dir = TempDir::new().unwrap();
        let cache = store(dir.path(), apt_locator(), T0);
        cache.put_rows(&KnownManagers::Apt, &plan("ripgrep"), &rows()).unwrap();

        let mut other = plan("ripgrep");
        other.limit = 10;
        assert!(cache.get_rows(&KnownManagers::Apt, &other).is_none());
    }

    #[test]
    fn test_write_gates() {
        let dir = TempDir::new().unwrap();
        let cache = store(dir.path(), apt_locator(), T0);
        assert!(!cache.put_rows(&KnownManagers::Apt, &plan("x"), &[]).unwrap());

        // dnf has no default query TTL
        let dnf = StaticLocator::with(["dnf"]);
        let cache = store(dir.path(), dnf, T0);
        assert!(!cache.put_rows(&KnownManagers::Dnf, &plan("x"), &rows()).unwrap());

        let mut settings = CacheSettings::with_root(dir.path());
        settings.skip_query_cache_write = true;
        let cache = CacheStore::new(settings, Arc::new(apt_locator())).with_clock(clock_at(T0));
        assert!(!cache.put_rows(&KnownManagers::Apt, &plan("x"), &rows()).unwrap());
        assert!(cache.stats().unwrap().iter().all(|s| s.entries == 0));
    }

    #[test]
    fn test_bypass_skips_reads() {
        let dir = TempDir::new().unwrap();
        store(dir.path(), apt_locator(), T0)
            .put_rows(&KnownManagers::Apt, &plan("ripgrep"), &rows())
            .unwrap();

        let mut settings = CacheSettings::with_root(dir.path());
        settings.bypass_query_cache = true;
        let cache = CacheStore::new(settings, Arc::new(apt_locator())).with_clock(clock_at(T0 + 1));
        assert!(cache.get_rows(&KnownManagers::Apt, &plan("ripgrep")).is_none());
    }

    #[test]
    fn test_installed_names_sorted_and_deduped() {
        let dir = TempDir::new().unwrap();
        let cache = store(dir.path(), StaticLocator::with(["brew"]), T0);
        let names = vec!["wget".to_string(), "bat".to_string(), "wget".to_string()];
        assert!(cache.put_names(&KnownManagers::Brew, &names).unwrap());

        let raw = fs::read_to_string(dir.path().join("installed").join("brew.txt")).unwrap();
        assert_eq!(raw, "bat\nwget\n");
        assert_eq!(
            cache.get_names(&KnownManagers::Brew),
            Some(vec!["bat".to_string(), "wget".to_string()])
        );
    }

    #[test]
    fn test_corrupt_metadata_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = store(dir.path(), StaticLocator::with(["brew"]), T0);
        cache.put_names(&KnownManagers::Brew, &["bat".to_string()]).unwrap();
        fs::write(dir.path().join("installed").join("brew.meta"), "format_version=9\n").unwrap();
        assert!(cache.get_names(&KnownManagers::Brew).is_none());
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = store(dir.path(), apt_locator(), T0);
        cache.put_rows(&KnownManagers::Apt, &plan("a"), &rows()).unwrap();
        cache.put_rows(&KnownManagers::Apt, &plan("b"), &rows()).unwrap();
        cache.put_names(&KnownManagers::Apt, &["curl".to_string()]).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats[0].namespace, "search");
        assert_eq!(stats[0].entries, 2);
        assert_eq!(stats[1].entries, 1);
        assert!(stats[0].bytes > 0);

        assert_eq!(cache.clear().unwrap(), 3);
        assert!(cache.get_rows(&KnownManagers::Apt, &plan("a")).is_none());
        assert_eq!(cache.clear().unwrap(), 0);
    }

    struct CountingAdapter {
        calls: AtomicUsize,
    }

    impl PackageAdapter for CountingAdapter {
        fn search<'a>(
            &'a self,
            _manager: &'a KnownManagers,
            _query: &'a BackendQuery,
        ) -> BoxFuture<'a, Result<Vec<SearchRow>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn installed<'a>(&'a self, _manager: &'a KnownManagers) -> BoxFuture<'a, Result<Vec<String>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["bat".to_string(), "ripgrep".to_string()])
            })
        }
    }

    #[tokio::test]
    async fn test_installed_index_memoizes_and_refreshes() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(CountingAdapter {
            calls: AtomicUsize::new(0),
        });
        let cache = store(dir.path(), StaticLocator::with(["brew"]), T0);
        let index = Arc::new(InstalledIndex::new(cache, adapter.clone()));

        let first = index.installed(&KnownManagers::Brew).await;
        assert!(first.contains("ripgrep"));
        index.installed(&KnownManagers::Brew).await;
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

        // the memo is gone but the disk entry still answers
        index.invalidate(&KnownManagers::Brew);
        index.installed(&KnownManagers::Brew).await;
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

        let count = index
            .spawn_refresh(KnownManagers::Brew)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }
}
