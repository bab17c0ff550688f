//! TTL + LRU cache over read results.
//!
//! Entries are keyed by `(storage id, collection key[, entity id])`.
//! Expired entries are dropped when touched. When the cache is full, the
//! least recently accessed fraction of entries is evicted in one pass.
//!
//! Every mutation of a collection invalidates all entries sharing its
//! `(storage id, collection key)` prefix, so a read never returns data
//! older than the last completed write to that collection.

use crate::config::CacheConfig;
use crate::types::{CollectionKey, StorageId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Type-erased cached value, downcast by the reader.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Storage identifier of the entity type.
    pub storage_id: StorageId,
    /// Collection key.
    pub collection_key: CollectionKey,
    /// Entity id for single-record entries, `None` for whole collections.
    pub entity_id: Option<String>,
}

impl CacheKey {
    /// Key for a whole collection.
    pub fn collection(storage_id: &StorageId, collection_key: &CollectionKey) -> Self {
        Self {
            storage_id: storage_id.clone(),
            collection_key: collection_key.clone(),
            entity_id: None,
        }
    }

    /// Key for a single entity.
    pub fn entity(
        storage_id: &StorageId,
        collection_key: &CollectionKey,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_id: storage_id.clone(),
            collection_key: collection_key.clone(),
            entity_id: Some(entity_id.into()),
        }
    }

    fn has_prefix(&self, storage_id: &StorageId, collection_key: &CollectionKey) -> bool {
        &self.storage_id == storage_id && &self.collection_key == collection_key
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Entries removed by prefix invalidation.
    pub invalidations: u64,
    /// Current number of entries.
    pub size: usize,
    /// `hits / (hits + misses)`, or 0 with no lookups.
    pub hit_rate: f64,
}

/// A TTL + LRU cache.
pub struct CacheLayer<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    config: CacheConfig,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl<V: Clone> CacheLayer<V> {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Looks up `key`, dropping it if expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = self.next_tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(storage_id = %key.storage_id, collection_key = %key.collection_key, "cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts `value` with the default TTL.
    pub fn set(&self, key: CacheKey, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Inserts `value` expiring after `ttl`.
    pub fn set_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.config.capacity {
            self.make_room(&mut entries, now);
        }

        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
            last_access: self.next_tick(),
        };
        entries.insert(key, entry);
    }

    fn make_room(&self, entries: &mut HashMap<CacheKey, CacheEntry<V>>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let expired = (before - entries.len()) as u64;
        if expired > 0 {
            self.expirations.fetch_add(expired, Ordering::Relaxed);
        }
        if entries.len() < self.config.capacity {
            return;
        }

        let batch = self.config.eviction_batch();
        let mut by_age: Vec<(u64, CacheKey)> = entries
            .iter()
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(tick, _)| *tick);

        let mut evicted = 0u64;
        for (_, key) in by_age.into_iter().take(batch) {
            if entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::trace!(evicted, "cache full, evicted least recently used entries");
    }

    /// Removes every entry under `(storage_id, collection_key)`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&self, storage_id: &StorageId, collection_key: &CollectionKey) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.has_prefix(storage_id, collection_key));
        let removed = before - entries.len();
        if removed > 0 {
            self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::trace!(%storage_id, %collection_key, removed, "cache invalidated");
        }
        removed
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Removes all entries. Counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            size: self.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}
