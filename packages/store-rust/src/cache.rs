//! Bounded, TTL-aware LRU cache over domain values.
//!
//! One mutex guards both the entry map and the usage order, so every
//! operation is atomic with respect to eviction. The cache optimizes for
//! correctness under concurrent access, not for lock-free reads.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stratum_core::ClockSource;

struct CacheEntry<V> {
    value: V,
    inserted_at_ms: u64,
    tick: u64,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Usage order: ascending tick = least recently used first.
    usage: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K, V> CacheInner<K, V> {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }
}

/// Bounded LRU cache with optional time-to-live.
///
/// `ttl: None` disables expiry entirely. Time is read through the injected
/// clock, so tests can expire entries without sleeping.
pub struct MemoryCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    max_size: usize,
    ttl: Option<Duration>,
    clock: Arc<dyn ClockSource>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache bounded to `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize, ttl: Option<Duration>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                usage: BTreeMap::new(),
                next_tick: 0,
            }),
            max_size,
            ttl,
            clock,
        }
    }

    /// Looks up `key`, promoting it to most recently used on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => self.is_expired(entry.inserted_at_ms, now_ms),
        };

        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.usage.remove(&entry.tick);
            }
            return None;
        }

        let tick = inner.bump();
        let entry = inner.entries.get_mut(key).expect("entry checked above");
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let value = entry.value.clone();
        inner.usage.remove(&old_tick);
        inner.usage.insert(tick, key.clone());
        Some(value)
    }

    /// Inserts or updates `key`, returning `true` for a new insertion.
    ///
    /// Inserting a new key at capacity atomically evicts the least recently
    /// used entry first. Updating an existing key never evicts.
    pub fn put(&self, key: K, value: V) -> bool {
        if self.max_size == 0 {
            return false;
        }
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get(&key) {
            let old_tick = entry.tick;
            let tick = inner.bump();
            inner.usage.remove(&old_tick);
            inner.usage.insert(tick, key.clone());
            let entry = inner.entries.get_mut(&key).expect("entry checked above");
            entry.value = value;
            entry.inserted_at_ms = now_ms;
            entry.tick = tick;
            return false;
        }

        if inner.entries.len() >= self.max_size {
            let oldest_tick = inner.usage.keys().next().copied();
            if let Some(oldest_tick) = oldest_tick {
                if let Some(victim) = inner.usage.remove(&oldest_tick) {
                    inner.entries.remove(&victim);
                    tracing::debug!(remaining = inner.entries.len(), "evicted lru cache entry");
                }
            }
        }

        let tick = inner.bump();
        inner.usage.insert(tick, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at_ms: now_ms,
                tick,
            },
        );
        true
    }

    /// Removes `key`, returning whether an entry existed.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.usage.remove(&entry.tick);
                true
            }
            None => false,
        }
    }

    /// Empties the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.usage.clear();
    }

    /// Keeps only entries whose key satisfies `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        let mut inner = self.inner.lock();
        let mut dropped_ticks = Vec::new();
        inner.entries.retain(|key, entry| {
            let kept = keep(key);
            if !kept {
                dropped_ticks.push(entry.tick);
            }
            kept
        });
        for tick in dropped_ticks {
            inner.usage.remove(&tick);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn is_expired(&self, inserted_at_ms: u64, now_ms: u64) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        match self.ttl {
            None => false,
            Some(ttl) => now_ms.saturating_sub(inserted_at_ms) > ttl.as_millis() as u64,
        }
    }
}
