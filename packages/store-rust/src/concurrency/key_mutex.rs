//! Per-key write serialization.
//!
//! Hands out one `tokio::sync::Mutex` per key from a bounded LRU registry.
//! The registry never evicts a handle that is still held: eviction inspects
//! the handle's refcount, and a handle with an outstanding holder (or a
//! parked waiter) always has more than one reference.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use stratum_core::StoreKey;
use tokio::sync::Mutex as AsyncMutex;

/// Default bound on the number of retained mutex handles.
pub const DEFAULT_CAPACITY: usize = 1000;

struct Handle {
    lock: Arc<AsyncMutex<()>>,
    tick: u64,
}

struct KeyMutexInner {
    handles: HashMap<StoreKey, Handle>,
    /// Usage order: ascending tick = least recently used first.
    usage: BTreeMap<u64, StoreKey>,
    next_tick: u64,
}

/// Bounded registry of per-key async mutexes.
pub struct KeyMutex {
    inner: Mutex<KeyMutexInner>,
    capacity: usize,
}

impl KeyMutex {
    /// Creates a registry with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a registry bounded to `capacity` idle handles.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(KeyMutexInner {
                handles: HashMap::new(),
                usage: BTreeMap::new(),
                next_tick: 0,
            }),
            capacity,
        }
    }

    /// Returns the mutex for `key`, creating it if needed.
    ///
    /// Acquiring the returned mutex is the caller's suspension point; this
    /// method itself never suspends.
    pub fn for_key(&self, key: &StoreKey) -> Arc<AsyncMutex<()>> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick;
        inner.next_tick += 1;

        if let Some(handle) = inner.handles.get_mut(key) {
            let old_tick = std::mem::replace(&mut handle.tick, tick);
            let lock = Arc::clone(&handle.lock);
            inner.usage.remove(&old_tick);
            inner.usage.insert(tick, key.clone());
            return lock;
        }

        if inner.handles.len() >= self.capacity {
            Self::evict_one_idle(&mut inner);
        }

        let lock = Arc::new(AsyncMutex::new(()));
        inner.usage.insert(tick, key.clone());
        inner.handles.insert(
            key.clone(),
            Handle {
                lock: Arc::clone(&lock),
                tick,
            },
        );
        lock
    }

    /// Number of retained handles.
    pub fn len(&self) -> usize {
        self.inner.lock().handles.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().handles.is_empty()
    }

    /// Removes the least recently used handle with no outside references.
    ///
    /// If every handle is currently held the registry grows past its
    /// capacity instead of blocking or evicting a live lock.
    fn evict_one_idle(inner: &mut KeyMutexInner) {
        let victim = inner
            .usage
            .iter()
            .find(|(_, key)| {
                inner
                    .handles
                    .get(*key)
                    .is_some_and(|h| Arc::strong_count(&h.lock) == 1)
            })
            .map(|(tick, key)| (*tick, key.clone()));

        if let Some((tick, key)) = victim {
            inner.usage.remove(&tick);
            inner.handles.remove(&key);
            tracing::debug!(key = %key, "evicted idle key mutex");
        }
    }
}

impl Default for KeyMutex {
    fn default() -> Self {
        Self::new()
    }
}
