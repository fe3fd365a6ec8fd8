//! Per-gate cache of individual role/permission checks with TTL

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::CheckKind;

/// Default validity window of a cached check
pub const DEFAULT_CHECK_TTL: Duration = Duration::from_secs(30);

/// Cache key: kind of check plus the role/permission name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckKey {
    pub kind: CheckKind,
    pub value: String,
}

impl CheckKey {
    pub fn new(kind: CheckKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Cached check result
#[derive(Debug, Clone, Copy)]
pub struct CheckCacheEntry {
    pub result: bool,
    pub timestamp: Instant,
}

impl CheckCacheEntry {
    fn new(result: bool, timestamp: Instant) -> Self {
        Self { result, timestamp }
    }

    fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) >= ttl
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(bool),
    Miss,
    /// An entry existed but was past the TTL and has been dropped
    Expired,
}

impl CacheLookup {
    /// Cached result, if fresh
    pub fn result(self) -> Option<bool> {
        match self {
            CacheLookup::Hit(result) => Some(result),
            CacheLookup::Miss | CacheLookup::Expired => None,
        }
    }
}

#[derive(Default)]
struct CacheState {
    /// Principal the entries belong to
    owner: Option<String>,
    entries: HashMap<CheckKey, CheckCacheEntry>,
}

/// Check cache owned by one gate
///
/// Entries are only dropped lazily, when a lookup finds them past the TTL.
/// Entries can only be reached through a [`BoundCache`], which holds the
/// cache lock for its whole lifetime. Binding a principal other than the one
/// that populated the entries clears them.
pub struct CheckCache {
    state: Mutex<CacheState>,

    ttl: Duration,

    stats: Arc<DashMap<&'static str, usize>>,
}

impl CheckCache {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            stats: Arc::new(DashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lock the cache for `principal_id`, clearing it if another principal
    /// populated it
    ///
    /// Other callers block until the returned guard is dropped.
    pub fn bind(&self, principal_id: &str) -> BoundCache<'_> {
        let mut state = self.state.lock();
        let mut rebound = false;

        if state.owner.as_deref() != Some(principal_id) {
            if state.owner.is_some() {
                debug!(principal = principal_id, "Principal changed, clearing check cache");
                rebound = true;
            }
            state.entries.clear();
            state.owner = Some(principal_id.to_string());
        }

        BoundCache {
            cache: self,
            state,
            rebound,
        }
    }

    /// Drop every entry and the principal binding
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.owner = None;
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            entries: self.state.lock().entries.len(),
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Exclusive access to a [`CheckCache`] on behalf of one principal
pub struct BoundCache<'a> {
    cache: &'a CheckCache,
    state: MutexGuard<'a, CacheState>,
    rebound: bool,
}

impl BoundCache<'_> {
    /// Whether binding discarded another principal's entries
    pub fn rebound(&self) -> bool {
        self.rebound
    }

    /// Principal the cache is bound to
    pub fn principal_id(&self) -> &str {
        self.state.owner.as_deref().unwrap_or_default()
    }

    /// Look up `key`
    pub fn get(&mut self, key: &CheckKey) -> CacheLookup {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`
    pub fn get_at(&mut self, key: &CheckKey, now: Instant) -> CacheLookup {
        let ttl = self.cache.ttl;

        let lookup = match self.state.entries.get(key) {
            Some(entry) if entry.is_stale(ttl, now) => CacheLookup::Expired,
            Some(entry) => CacheLookup::Hit(entry.result),
            None => CacheLookup::Miss,
        };

        match lookup {
            CacheLookup::Hit(_) => self.cache.increment_stat("hits"),
            CacheLookup::Miss => self.cache.increment_stat("misses"),
            CacheLookup::Expired => {
                self.state.entries.remove(key);
                self.cache.increment_stat("expirations");
                self.cache.increment_stat("misses");
            }
        }

        lookup
    }

    /// Store a check result stamped with the current instant
    pub fn put(&mut self, key: CheckKey, result: bool) {
        self.put_at(key, result, Instant::now());
    }

    /// Store a check result stamped with `timestamp`
    pub fn put_at(&mut self, key: CheckKey, result: bool, timestamp: Instant) {
        self.state
            .entries
            .insert(key, CheckCacheEntry::new(result, timestamp));
    }
}

impl Default for CheckCache {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_TTL)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
