//! Per-entity metadata and per-key bookkeeping status.
//!
//! [`EntityMeta`] is extracted from the persisted projection by the caller's
//! converter; [`KeyStatus`] is the in-memory ledger a store keeps about its
//! own fetch attempts. Both are carried into freshness planning.

use serde::{Deserialize, Serialize};

/// Metadata describing a persisted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// When the persisted value was last written, epoch milliseconds.
    pub updated_at_ms: u64,
    /// Opaque validator returned by the origin, if any.
    pub etag: Option<String>,
}

impl EntityMeta {
    /// Creates metadata with no validator.
    #[must_use]
    pub fn new(updated_at_ms: u64) -> Self {
        Self {
            updated_at_ms,
            etag: None,
        }
    }

    /// Attaches an etag validator.
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Age of the value at `now_ms`, saturating to zero for future stamps.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.updated_at_ms)
    }
}

/// Per-key fetch bookkeeping: last success, last failure, validator, backoff.
///
/// All fields start empty; [`KeyStatus::default`] is the zero-valued status
/// returned for keys the store has never fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStatus {
    /// When the last fetch succeeded, epoch milliseconds.
    pub last_success_at_ms: Option<u64>,
    /// When the last fetch failed, epoch milliseconds.
    pub last_failure_at_ms: Option<u64>,
    /// Validator from the last successful response.
    pub last_etag: Option<String>,
    /// Fetches are suppressed until this instant, if set.
    pub backoff_until_ms: Option<u64>,
}

impl KeyStatus {
    /// Whether the key is inside an active backoff window at `now_ms`.
    #[must_use]
    pub fn is_backing_off(&self, now_ms: u64) -> bool {
        self.backoff_until_ms.is_some_and(|until| now_ms < until)
    }
}
