//! Inventory cache
//!
//! Memoizes normalized inventories per `(source, scope)` so repeated runs do
//! not hit the upstream listers while a snapshot is still fresh. Entries are
//! never mutated: a refresh replaces the whole entry. An entry is only reused
//! by a normalizer with the fingerprint it was built under.

mod store;

pub use store::{CacheStore, LoadedCache};

use crate::error::{CoverageError, FetchError, Result};
use crate::model::{InventoryItem, Source};
use crate::normalize::Normalizer;
use crate::raw::RawInventory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time source for freshness checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cache slot identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: Source,
    pub scope: String,
}

impl CacheKey {
    pub fn new(source: Source, scope: impl Into<String>) -> Self {
        Self {
            source,
            scope: scope.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.scope)
    }
}

/// Counters from the normalization pass that produced a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub skipped: usize,
    pub filtered: usize,
    pub malformed_tags: usize,
}

/// Cached snapshot of one scope
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<Vec<InventoryItem>>,
    pub fetched_at: DateTime<Utc>,
    pub stats: NormalizeStats,
    /// [`Normalizer::fingerprint`] of the pass that built the snapshot
    pub normalizer: String,
}

impl CacheEntry {
    /// Whether the entry is younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            // a TTL beyond chrono's range never expires
            return true;
        };
        now.signed_duration_since(self.fetched_at) < ttl
    }

    /// Whether the snapshot was built under `fingerprint`
    pub fn built_with(&self, fingerprint: &str) -> bool {
        self.normalizer == fingerprint
    }

    fn to_snapshot(&self, origin: CacheOrigin) -> Snapshot {
        Snapshot {
            items: Arc::clone(&self.snapshot),
            fetched_at: self.fetched_at,
            origin,
            stats: self.stats,
        }
    }
}

/// Where a returned snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Fetched and normalized during this call
    Fresh,
    /// Served from a live entry
    Cached,
    /// Served from an expired entry because the fetch failed
    Stale,
}

impl std::fmt::Display for CacheOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOrigin::Fresh => write!(f, "fresh"),
            CacheOrigin::Cached => write!(f, "cached"),
            CacheOrigin::Stale => write!(f, "stale"),
        }
    }
}

/// Inventory returned by [`InventoryCache::get_or_fetch`]
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub items: Arc<Vec<InventoryItem>>,
    pub fetched_at: DateTime<Utc>,
    pub origin: CacheOrigin,
    pub stats: NormalizeStats,
}

/// Read-through / write-through cache of normalized inventories
pub struct InventoryCache {
    entries: HashMap<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    serve_stale_on_error: bool,
    dirty: bool,
}

impl Default for InventoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InventoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryCache")
            .field("entries", &self.entries.len())
            .field("serve_stale_on_error", &self.serve_stale_on_error)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl InventoryCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            clock: Arc::new(SystemClock),
            serve_stale_on_error: false,
            dirty: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serve an expired snapshot when the upstream fetch fails (off by default)
    pub fn with_serve_stale_on_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_error = enabled;
        self
    }

    /// Return the snapshot for `(source, scope)`, fetching it when absent or older than `ttl`.
    ///
    /// `fetch` is called at most once and never retried. A failed fetch or a
    /// strict normalization error leaves any existing entry untouched. An entry
    /// built by a different normalizer counts as absent and is never served
    /// stale.
    pub fn get_or_fetch<F>(
        &mut self,
        source: Source,
        scope: &str,
        ttl: Duration,
        normalizer: &Normalizer,
        fetch: F,
    ) -> Result<Snapshot>
    where
        F: FnOnce() -> std::result::Result<RawInventory, FetchError>,
    {
        let key = CacheKey::new(source, scope);
        let now = self.clock.now();
        let fingerprint = normalizer.fingerprint();

        if let Some(entry) = self
            .entries
            .get(&key)
            .filter(|e| e.built_with(&fingerprint) && e.is_fresh(now, ttl))
        {
            debug!(%key, fetched_at = %entry.fetched_at, "Serving cached inventory");
            return Ok(entry.to_snapshot(CacheOrigin::Cached));
        }
        if let Some(entry) = self.entries.get(&key).filter(|e| !e.built_with(&fingerprint)) {
            debug!(%key, cached = %entry.normalizer, requested = %fingerprint, "Cached inventory built by another normalizer");
        }

        match fetch() {
            Ok(raw) => {
                let normalized = normalizer
                    .normalize(source, raw)
                    .map_err(|e| e.in_scope(scope))?;
                let entry = CacheEntry {
                    snapshot: Arc::new(normalized.items),
                    fetched_at: now,
                    stats: NormalizeStats {
                        skipped: normalized.skipped.len(),
                        filtered: normalized.filtered,
                        malformed_tags: normalized.malformed_tags,
                    },
                    normalizer: fingerprint,
                };
                let snapshot = entry.to_snapshot(CacheOrigin::Fresh);
                info!(%key, items = snapshot.items.len(), "Fetched inventory");
                self.entries.insert(key, entry);
                self.dirty = true;
                Ok(snapshot)
            }
            Err(err) => {
                let stale = self
                    .entries
                    .get(&key)
                    .filter(|e| self.serve_stale_on_error && e.built_with(&fingerprint));
                if let Some(entry) = stale {
                    warn!(
                        %key,
                        fetched_at = %entry.fetched_at,
                        error = %err,
                        "Fetch failed, serving stale inventory"
                    );
                    return Ok(entry.to_snapshot(CacheOrigin::Stale));
                }
                Err(CoverageError::Fetch {
                    origin: source,
                    scope: scope.to_string(),
                    source: err,
                })
            }
        }
    }

    pub fn get(&self, source: Source, scope: &str) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::new(source, scope))
    }

    /// Drop one entry so the next lookup refetches
    pub fn invalidate(&mut self, source: Source, scope: &str) -> bool {
        let removed = self.entries.remove(&CacheKey::new(source, scope)).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Entries sorted by key
    pub fn entries(&self) -> Vec<(&CacheKey, &CacheEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether entries changed since load
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn insert_loaded(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }
}
