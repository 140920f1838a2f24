#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistent postal code → coordinate cache.
//!
//! [`CoordinateCache`] has an explicit lifecycle: [`load`](CoordinateCache::load)
//! it from disk, [`resolve`](CoordinateCache::resolve) codes through it, and
//! [`persist`](CoordinateCache::persist) it back. Every postal code is
//! resolved at most once per cache lifetime: concurrent requests for the
//! same missing code wait on a single in-flight lookup, and the outcome
//! (coordinate or permanent failure) is stored before anyone returns.
//!
//! Failures are cached too. A code is retried only after it is explicitly
//! invalidated with [`invalidate`](CoordinateCache::invalidate) or
//! [`invalidate_unresolved`](CoordinateCache::invalidate_unresolved).

pub mod retry;
pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use employment_map_employment_models::PostalCode;
use employment_map_geocoder::PostalGeocoder;
use employment_map_geography_models::Coordinate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;

pub use retry::RetryPolicy;

/// Default number of new entries between automatic checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 50;

/// The cached outcome of resolving one postal code.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Normalized postal code.
    pub postal_code: PostalCode,
    /// Resolved coordinate, or `None` for a permanent failure.
    pub coordinate: Option<Coordinate>,
    /// Provider tag of a successful resolution.
    pub source: Option<String>,
    /// When the resolution was attempted.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Whether the entry holds a coordinate.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.coordinate.is_some()
    }
}

/// Result of [`CoordinateCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// The entry for the postal code.
    pub entry: CacheEntry,
    /// `true` if this call created the entry (i.e. the geocoder ran).
    pub fresh: bool,
}

/// Tunables for a [`CoordinateCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Retry policy for transient geocoder errors.
    pub retry: RetryPolicy,
    /// Persist after this many new entries; `0` disables checkpoints.
    pub checkpoint_every: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }
}

/// Entry counts for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// All entries.
    pub total: usize,
    /// Entries with a coordinate.
    pub resolved: usize,
    /// Cached failures.
    pub unresolved: usize,
    /// Resolved entries per provider tag.
    pub by_source: BTreeMap<String, usize>,
}

/// Structural cache failures. These abort a run.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file could not be read, written, or renamed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The cache file exists but its contents are inconsistent.
    #[error("Corrupt cache {path} at line {line}: {message}")]
    Corrupt {
        /// Cache file.
        path: PathBuf,
        /// 1-based line number.
        line: u64,
        /// What was wrong.
        message: String,
    },

    /// The background persistence task panicked or was cancelled.
    #[error("Cache persistence task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors from [`CoordinateCache::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The geocoder could not locate the code (now or in an earlier run).
    #[error("Postal code {code} could not be resolved")]
    Unresolvable {
        /// The postal code.
        code: PostalCode,
    },

    /// A checkpoint failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

type Slot = Arc<OnceCell<CacheEntry>>;

/// Postal code → coordinate cache with at-most-once resolution.
pub struct CoordinateCache {
    path: Option<PathBuf>,
    options: CacheOptions,
    slots: Mutex<BTreeMap<PostalCode, Slot>>,
    /// Entries created or removed since the last persist.
    dirty: AtomicUsize,
    /// Serializes writers of the cache file.
    persist_lock: tokio::sync::Mutex<()>,
}

impl CoordinateCache {
    /// Creates an empty cache that is never written to disk.
    #[must_use]
    pub fn in_memory(options: CacheOptions) -> Self {
        Self::with_entries(None, options, Vec::new())
    }

    /// Loads the cache at `path`. A missing file yields an empty cache
    /// that will be created on the first persist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] if the file exists but cannot be
    /// decoded.
    pub fn load(path: &Path, options: CacheOptions) -> Result<Self, CacheError> {
        let entries = if path.exists() {
            store::read_csv(path)?
        } else {
            log::info!("No coordinate cache at {}, starting empty", path.display());
            Vec::new()
        };

        let cache = Self::with_entries(Some(path.to_path_buf()), options, entries);
        let stats = cache.stats();
        log::info!(
            "Loaded coordinate cache: {} entries ({} resolved, {} unresolved)",
            stats.total,
            stats.resolved,
            stats.unresolved
        );
        Ok(cache)
    }

    fn with_entries(path: Option<PathBuf>, options: CacheOptions, entries: Vec<CacheEntry>) -> Self {
        let slots = entries
            .into_iter()
            .map(|entry| (entry.postal_code.clone(), Arc::new(OnceCell::new_with(Some(entry)))))
            .collect();

        Self {
            path,
            options,
            slots: Mutex::new(slots),
            dirty: AtomicUsize::new(0),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path the cache persists to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<PostalCode, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, code: &PostalCode) -> Slot {
        Arc::clone(
            self.slots()
                .entry(code.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Returns the entry for `code` without resolving it.
    #[must_use]
    pub fn get(&self, code: &PostalCode) -> Option<CacheEntry> {
        self.slots().get(code).and_then(|slot| slot.get().cloned())
    }

    /// Returns `true` if `code` has a settled entry.
    #[must_use]
    pub fn contains(&self, code: &PostalCode) -> bool {
        self.get(code).is_some()
    }

    /// Returns the entry for `code`, resolving it through `geocoder` if
    /// it is not cached yet.
    ///
    /// Never calls the geocoder for a code that already has an entry, and
    /// never calls it twice concurrently for the same code.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] only if a checkpoint triggered by this call
    /// fails; lookup failures are cached as unresolved entries.
    pub async fn lookup(
        &self,
        code: &PostalCode,
        geocoder: &dyn PostalGeocoder,
    ) -> Result<Lookup, CacheError> {
        let slot = self.slot(code);

        let fresh = AtomicBool::new(false);
        let entry = slot
            .get_or_init(|| async {
                fresh.store(true, Ordering::SeqCst);
                self.attempt(code, geocoder).await
            })
            .await
            .clone();

        let fresh = fresh.into_inner();
        if fresh {
            self.mark_dirty().await?;
        }

        Ok(Lookup { entry, fresh })
    }

    /// Returns the coordinate for `code`, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unresolvable`] if the code has no coordinate
    /// (now or cached from an earlier attempt), and [`ResolveError::Cache`]
    /// if a checkpoint fails.
    pub async fn resolve(
        &self,
        code: &PostalCode,
        geocoder: &dyn PostalGeocoder,
    ) -> Result<Coordinate, ResolveError> {
        self.lookup(code, geocoder)
            .await?
            .entry
            .coordinate
            .ok_or_else(|| ResolveError::Unresolvable { code: code.clone() })
    }

    /// Runs the geocoder under the retry policy and builds the entry.
    async fn attempt(&self, code: &PostalCode, geocoder: &dyn PostalGeocoder) -> CacheEntry {
        let policy = self.options.retry;
        let mut attempt = 1;

        let outcome = loop {
            match geocoder.geocode(code).await {
                Ok(Some(hit)) => break Some(hit),
                Ok(None) => {
                    log::warn!("Postal code {code} not found by any provider");
                    break None;
                }
                Err(e) if attempt < policy.attempts() => {
                    let delay = policy.delay_after(attempt);
                    log::debug!(
                        "Postal code {code}: attempt {attempt} failed ({e}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::warn!("Postal code {code} unresolvable after {attempt} attempts: {e}");
                    break None;
                }
            }
        };

        CacheEntry {
            postal_code: code.clone(),
            coordinate: outcome.as_ref().map(|hit| hit.coordinate),
            source: outcome.map(|hit| hit.source),
            resolved_at: Some(Utc::now()),
        }
    }

    async fn mark_dirty(&self) -> Result<(), CacheError> {
        let dirty = self.dirty.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.options.checkpoint_every;
        if every > 0 && dirty >= every && self.path.is_some() {
            log::debug!("Checkpointing coordinate cache after {dirty} new entries");
            self.persist().await?;
        }
        Ok(())
    }

    /// Number of changes not yet persisted.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Snapshot of every settled entry, ordered by postal code.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.slots()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    /// Writes the cache to its file atomically. Returns the number of
    /// entries written; in-memory caches write nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the file cannot be written.
    pub async fn persist(&self) -> Result<usize, CacheError> {
        let Some(path) = self.path.clone() else {
            return Ok(0);
        };

        let _guard = self.persist_lock.lock().await;
        self.dirty.store(0, Ordering::SeqCst);
        let entries = self.entries();
        let count = entries.len();

        tokio::task::spawn_blocking(move || store::write_csv_atomic(&path, &entries)).await??;

        log::debug!("Persisted {count} coordinate cache entries");
        Ok(count)
    }

    /// Drops the entry for `code` so the next lookup resolves it again.
    /// Returns `true` if an entry was removed.
    ///
    /// A lookup still in flight for `code` is left alone and its outcome
    /// is kept.
    pub fn invalidate(&self, code: &PostalCode) -> bool {
        let mut slots = self.slots();
        let removed = slots.get(code).is_some_and(|slot| slot.initialized());
        if removed {
            slots.remove(code);
        }
        drop(slots);

        if removed {
            self.dirty.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Drops every cached failure. Returns the number removed.
    pub fn invalidate_unresolved(&self) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| slot.get().is_none_or(CacheEntry::is_resolved));
        let removed = before - slots.len();
        drop(slots);

        self.dirty.fetch_add(removed, Ordering::SeqCst);
        removed
    }

    /// Adds `entries` for codes that have no entry yet. Returns the number
    /// added.
    pub fn merge(&self, entries: Vec<CacheEntry>) -> usize {
        let mut slots = self.slots();
        let mut added = 0;
        for entry in entries {
            let slot = slots
                .entry(entry.postal_code.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            if slot.set(entry).is_ok() {
                added += 1;
            }
        }
        drop(slots);

        self.dirty.fetch_add(added, Ordering::SeqCst);
        added
    }

    /// Imports a legacy JSON cache file. Existing entries win.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the file cannot be read or is not a JSON
    /// object.
    pub fn import_legacy(&self, path: &Path) -> Result<usize, CacheError> {
        let entries = store::read_legacy_json(path)?;
        let seen = entries.len();
        let added = self.merge(entries);
        log::info!(
            "Imported {added} of {seen} legacy cache entries from {}",
            path.display()
        );
        Ok(added)
    }

    /// Entry counts.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries() {
            stats.total += 1;
            if entry.is_resolved() {
                stats.resolved += 1;
                let source = entry.source.unwrap_or_else(|| "unknown".to_string());
                *stats.by_source.entry(source).or_default() += 1;
            } else {
                stats.unresolved += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use employment_map_geocoder::{GeocodeError, GeocodedPostalCode};

    use super::*;

    /// Geocoder double that counts calls and fails a fixed number of
    /// times before answering.
    struct MockGeocoder {
        known: BTreeMap<String, Coordinate>,
        transient_failures: AtomicU32,
        calls: AtomicUsize,
        latency: Duration,
    }

    impl MockGeocoder {
        fn new(known: &[(&str, f64, f64)]) -> Self {
            Self {
                known: known
                    .iter()
                    .map(|(code, lat, lon)| ((*code).to_string(), Coordinate::new(*lat, *lon)))
                    .collect(),
                transient_failures: AtomicU32::new(0),
                calls: AtomicUsize::new(0),
                latency: Duration::ZERO,
            }
        }

        fn failing_first(self, n: u32) -> Self {
            self.transient_failures.store(n, Ordering::SeqCst);
            self
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostalGeocoder for MockGeocoder {
        fn id(&self) -> &str {
            "mock"
        }

        async fn geocode(
            &self,
            code: &PostalCode,
        ) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(GeocodeError::RateLimited);
            }
            Ok(self
                .known
                .get(code.as_str())
                .map(|coordinate| GeocodedPostalCode {
                    coordinate: *coordinate,
                    source: "mock".to_string(),
                    matched_address: None,
                }))
        }
    }

    fn code(s: &str) -> PostalCode {
        PostalCode::parse(s).unwrap()
    }

    fn fast_options() -> CacheOptions {
        CacheOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            checkpoint_every: 0,
        }
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)]);
        let cache = CoordinateCache::in_memory(fast_options());

        let first = cache.resolve(&code("64000000"), &geocoder).await.unwrap();
        let second = cache.resolve(&code("64000-000"), &geocoder).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.latitude.to_bits(), (-5.0892_f64).to_bits());
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn lookup_reports_freshness() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)]);
        let cache = CoordinateCache::in_memory(fast_options());

        assert!(cache.lookup(&code("64000000"), &geocoder).await.unwrap().fresh);
        assert!(!cache.lookup(&code("64000000"), &geocoder).await.unwrap().fresh);
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_once() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)])
            .with_latency(Duration::from_millis(20));
        let cache = CoordinateCache::in_memory(fast_options());
        let target = code("64000000");

        let results = futures::future::join_all(
            (0..16).map(|_| cache.lookup(&target, &geocoder)),
        )
        .await;

        assert_eq!(geocoder.calls(), 1);
        assert_eq!(results.iter().filter(|r| r.as_ref().unwrap().fresh).count(), 1);
        assert!(results.iter().all(|r| r.as_ref().unwrap().entry.is_resolved()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_resolve_once() {
        let geocoder = Arc::new(
            MockGeocoder::new(&[("64000000", -5.0892, -42.8019)])
                .with_latency(Duration::from_millis(20)),
        );
        let cache = Arc::new(CoordinateCache::in_memory(fast_options()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let geocoder = Arc::clone(&geocoder);
                tokio::spawn(async move {
                    cache
                        .resolve(&code("64000000"), geocoder.as_ref())
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Coordinate::new(-5.0892, -42.8019));
        }
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached_as_unresolved() {
        let geocoder = MockGeocoder::new(&[]);
        let cache = CoordinateCache::in_memory(fast_options());

        for _ in 0..3 {
            assert!(matches!(
                cache.resolve(&code("64099999"), &geocoder).await,
                Err(ResolveError::Unresolvable { .. })
            ));
        }
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(cache.stats().unresolved, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)]).failing_first(2);
        let cache = CoordinateCache::in_memory(fast_options());

        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_ok());
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_cache_a_failure() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)]).failing_first(10);
        let cache = CoordinateCache::in_memory(fast_options());

        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_err());
        assert_eq!(geocoder.calls(), 3);

        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_err());
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn invalidation_forces_a_new_lookup() {
        let geocoder = MockGeocoder::new(&[("64000000", -5.0892, -42.8019)]).failing_first(3);
        let cache = CoordinateCache::in_memory(fast_options());

        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_err());
        assert_eq!(cache.invalidate_unresolved(), 1);
        assert!(!cache.contains(&code("64000000")));

        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_ok());
        assert_eq!(geocoder.calls(), 4);

        assert!(cache.invalidate(&code("64000000")));
        assert!(!cache.invalidate(&code("64000000")));
        assert!(cache.resolve(&code("64000000"), &geocoder).await.is_ok());
        assert_eq!(geocoder.calls(), 5);
    }

    /// Answers only after `release` is notified, signalling `started`
    /// once the lookup is in flight.
    struct GatedGeocoder {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PostalGeocoder for GatedGeocoder {
        fn id(&self) -> &str {
            "gated"
        }

        async fn geocode(
            &self,
            _code: &PostalCode,
        ) -> Result<Option<GeocodedPostalCode>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(Some(GeocodedPostalCode {
                coordinate: Coordinate::new(-5.0892, -42.8019),
                source: "gated".to_string(),
                matched_address: None,
            }))
        }
    }

    #[tokio::test]
    async fn invalidate_during_lookup_keeps_the_outcome() {
        let geocoder = GatedGeocoder {
            started: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            calls: AtomicUsize::new(0),
        };
        let cache = CoordinateCache::in_memory(fast_options());
        let target = code("64000000");

        let (lookup, removed) = tokio::join!(cache.lookup(&target, &geocoder), async {
            geocoder.started.notified().await;
            let removed = cache.invalidate(&target);
            geocoder.release.notify_one();
            removed
        });

        assert!(!removed);
        let lookup = lookup.unwrap();
        assert!(lookup.fresh);
        assert_eq!(cache.get(&target), Some(lookup.entry));

        let again = cache.lookup(&target, &geocoder).await.unwrap();
        assert!(!again.fresh);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persisted_cache_round_trips_without_new_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinates.csv");
        let geocoder = MockGeocoder::new(&[("64000000", -5.089_217_3, -42.801_934_1)]);

        let cache = CoordinateCache::load(&path, fast_options()).unwrap();
        let first = cache.resolve(&code("64000000"), &geocoder).await.unwrap();
        assert!(cache.resolve(&code("64099999"), &geocoder).await.is_err());
        assert_eq!(cache.persist().await.unwrap(), 2);
        let written = std::fs::read(&path).unwrap();

        let fresh_geocoder = MockGeocoder::new(&[]);
        let reloaded = CoordinateCache::load(&path, fast_options()).unwrap();
        let second = reloaded
            .resolve(&code("64000000"), &fresh_geocoder)
            .await
            .unwrap();
        assert!(
            reloaded
                .resolve(&code("64099999"), &fresh_geocoder)
                .await
                .is_err()
        );

        assert_eq!(fresh_geocoder.calls(), 0);
        assert_eq!(first.latitude.to_bits(), second.latitude.to_bits());
        assert_eq!(first.longitude.to_bits(), second.longitude.to_bits());

        reloaded.persist().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), written);
    }

    #[tokio::test]
    async fn checkpoints_persist_without_explicit_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinates.csv");
        let geocoder = MockGeocoder::new(&[
            ("64000000", -5.0892, -42.8019),
            ("64049110", -5.0781, -42.7842),
        ]);
        let options = CacheOptions {
            checkpoint_every: 2,
            ..fast_options()
        };

        let cache = CoordinateCache::load(&path, options).unwrap();
        cache.resolve(&code("64000000"), &geocoder).await.unwrap();
        assert!(!path.exists());
        cache.resolve(&code("64049110"), &geocoder).await.unwrap();
        assert!(path.exists());
        assert_eq!(cache.pending_changes(), 0);

        assert_eq!(store::read_csv(&path).unwrap().len(), 2);
    }

    #[test]
    fn corrupt_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinates.csv");
        std::fs::write(
            &path,
            "postal_code,latitude,longitude,resolved,source,resolved_at\n\
             00000000,-5.0,-42.8,true,mock,\n",
        )
        .unwrap();

        assert!(matches!(
            CoordinateCache::load(&path, fast_options()),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn legacy_import_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.json");
        std::fs::write(
            &legacy,
            r#"{"64000000": {"lat": -6.0, "lon": -43.0, "source": "nominatim"}, "64049110": null}"#,
        )
        .unwrap();

        let cache = CoordinateCache::in_memory(fast_options());
        cache.merge(vec![CacheEntry {
            postal_code: code("64000000"),
            coordinate: Some(Coordinate::new(-5.0892, -42.8019)),
            source: Some("mock".to_string()),
            resolved_at: None,
        }]);

        assert_eq!(cache.import_legacy(&legacy).unwrap(), 1);
        assert_eq!(
            cache.get(&code("64000000")).unwrap().coordinate,
            Some(Coordinate::new(-5.0892, -42.8019))
        );
        assert!(!cache.get(&code("64049110")).unwrap().is_resolved());

        let stats = cache.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_source.get("mock"), Some(&1));
    }
}
