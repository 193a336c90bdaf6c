//! Per-key fetch bookkeeping.
//!
//! Tracks last success, last failure, the most recent validator, and any
//! active backoff window per key. Entries live for the life of the store
//! unless explicitly cleared by invalidation.

use dashmap::DashMap;
use stratum_core::{KeyStatus, Namespace, StoreError, StoreKey};

/// Concurrent map of [`KeyStatus`] keyed by [`StoreKey`].
#[derive(Default)]
pub struct Bookkeeper {
    statuses: DashMap<StoreKey, KeyStatus>,
}

impl Bookkeeper {
    /// Creates an empty bookkeeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful fetch (full response or revalidation).
    ///
    /// Refreshes the validator when one was returned and clears any active
    /// backoff window.
    pub fn record_success(&self, key: &StoreKey, etag: Option<String>, at_ms: u64) {
        let mut status = self.statuses.entry(key.clone()).or_default();
        status.last_success_at_ms = Some(at_ms);
        status.backoff_until_ms = None;
        if etag.is_some() {
            status.last_etag = etag;
        }
    }

    /// Records a failed fetch.
    ///
    /// A [`StoreError::RateLimited`] cause with a wait hint opens a backoff
    /// window that the freshness planner honors.
    pub fn record_failure(&self, key: &StoreKey, cause: &StoreError, at_ms: u64) {
        let mut status = self.statuses.entry(key.clone()).or_default();
        status.last_failure_at_ms = Some(at_ms);
        if let StoreError::RateLimited {
            retry_after: Some(wait),
        } = cause
        {
            #[allow(clippy::cast_possible_truncation)]
            let until = at_ms.saturating_add(wait.as_millis() as u64);
            status.backoff_until_ms = Some(until);
            tracing::debug!(key = %key, until_ms = until, "rate limited, backing off");
        }
    }

    /// Opens (or moves) a backoff window for `key`.
    pub fn set_backoff(&self, key: &StoreKey, until_ms: u64) {
        let mut status = self.statuses.entry(key.clone()).or_default();
        status.backoff_until_ms = Some(until_ms);
    }

    /// Returns the status for `key`, zero-valued when never recorded.
    #[must_use]
    pub fn last_status(&self, key: &StoreKey) -> KeyStatus {
        self.statuses
            .get(key)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Forgets the status for `key`.
    pub fn clear(&self, key: &StoreKey) {
        self.statuses.remove(key);
    }

    /// Forgets every status whose key lives in `namespace`.
    pub fn clear_namespace(&self, namespace: &Namespace) {
        self.statuses.retain(|key, _| key.namespace() != namespace);
    }

    /// Forgets everything.
    pub fn clear_all(&self) {
        self.statuses.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stratum_core::NetworkError;

    use super::*;

    fn key(id: &str) -> StoreKey {
        StoreKey::by_id("app", "user", id)
    }

    #[test]
    fn absent_key_yields_zero_status() {
        let books = Bookkeeper::new();
        assert_eq!(books.last_status(&key("1")), KeyStatus::default());
    }

    #[test]
    fn success_updates_timestamp_and_etag() {
        let books = Bookkeeper::new();
        books.record_success(&key("1"), Some("v1".into()), 1_000);

        let status = books.last_status(&key("1"));
        assert_eq!(status.last_success_at_ms, Some(1_000));
        assert_eq!(status.last_etag.as_deref(), Some("v1"));
    }

    #[test]
    fn success_without_etag_keeps_previous_validator() {
        let books = Bookkeeper::new();
        books.record_success(&key("1"), Some("v1".into()), 1_000);
        books.record_success(&key("1"), None, 2_000);

        let status = books.last_status(&key("1"));
        assert_eq!(status.last_success_at_ms, Some(2_000));
        assert_eq!(status.last_etag.as_deref(), Some("v1"));
    }

    #[test]
    fn rate_limited_failure_opens_backoff_window() {
        let books = Bookkeeper::new();
        let cause = StoreError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        books.record_failure(&key("1"), &cause, 10_000);

        let status = books.last_status(&key("1"));
        assert_eq!(status.last_failure_at_ms, Some(10_000));
        assert_eq!(status.backoff_until_ms, Some(40_000));
        assert!(status.is_backing_off(20_000));
    }

    #[test]
    fn ordinary_failure_does_not_back_off() {
        let books = Bookkeeper::new();
        let cause = StoreError::Network(NetworkError::Timeout);
        books.record_failure(&key("1"), &cause, 10_000);

        let status = books.last_status(&key("1"));
        assert_eq!(status.backoff_until_ms, None);
    }

    #[test]
    fn success_clears_backoff() {
        let books = Bookkeeper::new();
        books.set_backoff(&key("1"), 50_000);
        books.record_success(&key("1"), None, 10_000);

        assert_eq!(books.last_status(&key("1")).backoff_until_ms, None);
    }

    #[test]
    fn namespace_clear_is_scoped() {
        let books = Bookkeeper::new();
        books.record_success(&StoreKey::by_id("a", "user", "1"), None, 1);
        books.record_success(&StoreKey::by_id("b", "user", "1"), None, 1);

        books.clear_namespace(&Namespace::new("a"));

        assert_eq!(
            books.last_status(&StoreKey::by_id("a", "user", "1")),
            KeyStatus::default()
        );
        assert_ne!(
            books.last_status(&StoreKey::by_id("b", "user", "1")),
            KeyStatus::default()
        );
    }

    #[test]
    fn clear_all_forgets_everything() {
        let books = Bookkeeper::new();
        books.record_success(&key("1"), None, 1);
        books.record_success(&key("2"), None, 1);
        books.clear_all();
        assert_eq!(books.last_status(&key("1")), KeyStatus::default());
        assert_eq!(books.last_status(&key("2")), KeyStatus::default());
    }
}
