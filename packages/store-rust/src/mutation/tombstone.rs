//! Deletion tombstones.
//!
//! A tombstone marks a key as deleted for a bounded time so that a stale
//! read (a lagging fetch response, a replication echo) cannot resurrect the
//! row before the origin has converged. Expired tombstones are pruned
//! lazily on check.

use dashmap::DashMap;
use stratum_core::StoreKey;

/// Concurrent map of `key → expires_at_ms`.
#[derive(Default)]
pub struct TombstoneMap {
    tombstones: DashMap<StoreKey, u64>,
}

impl TombstoneMap {
    /// Creates an empty tombstone map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places (or extends) a tombstone on `key` until `expires_at_ms`.
    pub fn place(&self, key: StoreKey, expires_at_ms: u64) {
        self.tombstones
            .entry(key)
            .and_modify(|current| *current = (*current).max(expires_at_ms))
            .or_insert(expires_at_ms);
    }

    /// Whether `key` is masked at `now_ms`. Expired tombstones are removed.
    #[must_use]
    pub fn is_active(&self, key: &StoreKey, now_ms: u64) -> bool {
        // Copy the expiry out before mutating: holding the read guard
        // across the removal would deadlock on the shard.
        let expires_at_ms = self.tombstones.get(key).map(|entry| *entry);
        match expires_at_ms {
            Some(at_ms) if now_ms < at_ms => true,
            Some(_) => {
                self.tombstones.remove(key);
                false
            }
            None => false,
        }
    }

    /// Removes the tombstone on `key`, if any (e.g. after a re-create).
    pub fn lift(&self, key: &StoreKey) {
        self.tombstones.remove(key);
    }

    /// Number of live tombstones (including not-yet-pruned expired ones).
    pub fn len(&self) -> usize {
        self.tombstones.len()
    }

    /// Whether no tombstone is recorded.
    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty()
    }
}
