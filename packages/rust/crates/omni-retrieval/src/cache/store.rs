//! QueryCache - in-process memo of fused results with TTL expiry and LRU eviction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::RetrievalError;
use crate::settings::CacheSettings;
use crate::types::{RetrievalConfig, ScoredPassage};

use super::key::CacheKey;

struct CacheEntry {
    query: String,
    config: RetrievalConfig,
    results: Arc<[ScoredPassage]>,
    created_at: Instant,
}

struct CacheState {
    /// Iteration order is most- to least-recently used.
    entries: LruCache<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    total_queries: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            hits: 0,
            misses: 0,
            total_queries: 0,
        }
    }
}

/// Snapshot of cache usage.
///
/// `hit_rate` is `hits / total_queries` (0 before any lookup), taken from the
/// running counters rather than current entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether the cache is accepting lookups and stores
    pub enabled: bool,
    /// Entries currently held
    pub total_entries: usize,
    /// Capacity bound
    pub max_entries: usize,
    /// Time-to-live in seconds (0 = no time expiry)
    pub ttl_seconds: u64,
    /// Lookups served from cache
    pub hits: u64,
    /// Lookups that missed or found an expired entry
    pub misses: u64,
    /// All lookups since creation or the last clear
    pub total_queries: u64,
    /// `hits / total_queries` in `[0, 1]`
    pub hit_rate: f64,
}

impl CacheStats {
    /// Hit rate as a percentage string, e.g. `"40.00%"`.
    #[must_use]
    pub fn hit_rate_percent(&self) -> String {
        format!("{:.2}%", self.hit_rate * 100.0)
    }
}

/// Bounded, time-limited memo of fused retrieval results.
///
/// One mutex guards the map, its recency order and the counters, so every
/// reader sees a whole before- or after-state of each `get`/`set`.
pub struct QueryCache {
    settings: CacheSettings,
    ttl: Option<Duration>,
    closed: AtomicBool,
    state: Mutex<CacheState>,
}

impl QueryCache {
    /// Create a cache; `max_entries` is clamped to at least 1.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        let settings = settings.normalized();
        tracing::info!(
            event = "retrieval.cache.initialized",
            enabled = settings.enabled,
            ttl_secs = settings.ttl_secs,
            max_entries = settings.max_entries,
            "query cache initialized"
        );
        Self {
            ttl: (settings.ttl_secs > 0).then(|| Duration::from_secs(settings.ttl_secs)),
            settings,
            closed: AtomicBool::new(false),
            state: Mutex::new(CacheState::new()),
        }
    }

    /// A cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        })
    }

    /// True while configured on and not closed.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled && !self.closed.load(Ordering::Acquire)
    }

    /// Effective settings.
    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Look up cached results; any cache failure is logged and reported as a miss.
    #[must_use]
    pub fn get(&self, query: &str, config: &RetrievalConfig) -> Option<Arc<[ScoredPassage]>> {
        self.try_get(query, config).unwrap_or_else(|error| {
            tracing::warn!(
                event = "retrieval.cache.get.failed",
                error = %error,
                "query cache lookup failed; treating as miss"
            );
            None
        })
    }

    /// Look up cached results.
    ///
    /// An entry whose age reached the TTL is evicted and counted as a miss.
    /// A hit moves the entry to the most-recently-used end.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CacheUnavailable`] when the cache lock is poisoned.
    pub fn try_get(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Option<Arc<[ScoredPassage]>>, RetrievalError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let key = CacheKey::new(query, config);
        let now = Instant::now();
        let mut state = self.lock()?;
        state.total_queries += 1;

        let Some(expired) = state
            .entries
            .peek(&key)
            .map(|entry| self.is_expired(entry, now))
        else {
            state.misses += 1;
            tracing::debug!(event = "retrieval.cache.miss", key = %key, "query cache miss");
            return Ok(None);
        };

        if expired {
            state.entries.pop(&key);
            state.misses += 1;
            tracing::debug!(event = "retrieval.cache.expired", key = %key, "query cache entry expired");
            return Ok(None);
        }

        state.hits += 1;
        let results = state.entries.get(&key).map(|entry| Arc::clone(&entry.results));
        tracing::debug!(event = "retrieval.cache.hit", key = %key, "query cache hit");
        Ok(results)
    }

    /// Store fused results; failures are logged and the result is simply not cached.
    pub fn set(&self, query: &str, config: &RetrievalConfig, results: Vec<ScoredPassage>) {
        if let Err(error) = self.try_set(query, config, results) {
            tracing::warn!(
                event = "retrieval.cache.set.failed",
                error = %error,
                "query cache store failed; result not cached"
            );
        }
    }

    /// Store fused results as the most-recently-used entry.
    ///
    /// Purges expired entries, then evicts least-recently-used entries until
    /// one slot is free. An existing entry for the same key is replaced and
    /// its timestamp refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CacheUnavailable`] when the cache lock is poisoned.
    pub fn try_set(
        &self,
        query: &str,
        config: &RetrievalConfig,
        results: Vec<ScoredPassage>,
    ) -> Result<(), RetrievalError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let key = CacheKey::new(query, config);
        let now = Instant::now();
        let mut state = self.lock()?;

        state.entries.pop(&key);
        let purged = self.purge_expired(&mut state.entries, now);
        if purged > 0 {
            tracing::debug!(event = "retrieval.cache.purged", purged, "expired cache entries removed");
        }

        while state.entries.len() >= self.settings.max_entries {
            let Some((evicted, _)) = state.entries.pop_lru() else {
                break;
            };
            tracing::debug!(
                event = "retrieval.cache.evicted",
                key = %evicted,
                "query cache full; evicted least recently used entry"
            );
        }

        state.entries.put(
            key,
            CacheEntry {
                query: query.to_string(),
                config: *config,
                results: results.into(),
                created_at: now,
            },
        );
        Ok(())
    }

    /// Remove every entry stored for exactly `query`, across all configs.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, query: &str) -> usize {
        let Ok(mut state) = self.lock() else {
            return 0;
        };
        let keys: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.query == query)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            state.entries.pop(key);
        }
        if !keys.is_empty() {
            tracing::info!(
                event = "retrieval.cache.invalidated",
                removed = keys.len(),
                "query cache entries invalidated"
            );
        }
        keys.len()
    }

    /// Remove all entries and reset the hit/miss/total counters.
    ///
    /// Also recovers a cache whose lock was poisoned.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            self.state.clear_poison();
            poisoned.into_inner()
        });
        *state = CacheState::new();
        tracing::info!(event = "retrieval.cache.cleared", "query cache cleared");
    }

    /// Same as [`Self::clear`].
    pub fn invalidate_all(&self) {
        self.clear();
    }

    /// Disable the cache for good and drop its entries.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut state) = self.lock() {
            state.entries.clear();
        }
        tracing::info!(event = "retrieval.cache.closed", "query cache closed");
    }

    /// Entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    /// True when no entry is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Config each live entry was stored under for `query`, most recent first.
    #[must_use]
    pub fn configs_for(&self, query: &str) -> Vec<RetrievalConfig> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .entries
            .iter()
            .filter(|(_, entry)| entry.query == query)
            .map(|(_, entry)| entry.config)
            .collect()
    }

    /// Usage statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let (total_entries, hits, misses, total_queries) = match self.lock() {
            Ok(state) => (
                state.entries.len(),
                state.hits,
                state.misses,
                state.total_queries,
            ),
            Err(_) => (0, 0, 0, 0),
        };
        let hit_rate = if total_queries == 0 {
            0.0
        } else {
            hits as f64 / total_queries as f64
        };
        CacheStats {
            enabled: self.is_enabled(),
            total_entries,
            max_entries: self.settings.max_entries,
            ttl_seconds: self.settings.ttl_secs,
            hits,
            misses,
            total_queries,
            hit_rate,
        }
    }

    /// Poison the state lock the way a panicking holder would.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.state.lock();
                    panic!("cache state holder panicked");
                })
                .join();
        });
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, RetrievalError> {
        self.state
            .lock()
            .map_err(|_| RetrievalError::CacheUnavailable("cache lock poisoned".to_string()))
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.created_at) >= ttl)
    }

    fn purge_expired(&self, entries: &mut LruCache<CacheKey, CacheEntry>, now: Instant) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
