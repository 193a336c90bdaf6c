//! Error taxonomy shared by the read and mutation pipelines.
//!
//! Every transport or persistence failure is mapped into [`StoreError`]
//! before it crosses a store boundary, so callers match on stable variants
//! instead of backend-specific error types. Retryability is a static
//! property of the variant, used by out-of-core retry schedulers.

use std::time::Duration;

use thiserror::Error;

use crate::key::StoreKey;

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,
    /// No route to the origin (offline, airplane mode, link down).
    #[error("no network connection")]
    NoConnection,
    /// The origin answered with a non-success status.
    #[error("http status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, when the transport captured one.
        body: Option<String>,
    },
    /// Name resolution failed.
    #[error("dns resolution failed")]
    Dns,
    /// TLS negotiation failed.
    #[error("tls handshake failed")]
    Tls,
}

impl NetworkError {
    /// Whether a retry can reasonably succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::NoConnection | Self::Dns => true,
            Self::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            Self::Tls => false,
        }
    }
}

/// Durable-store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// A read from the source of truth failed.
    #[error("persistence read failed")]
    Read,
    /// A write to the source of truth failed.
    #[error("persistence write failed")]
    Write,
    /// A delete against the source of truth failed.
    #[error("persistence delete failed")]
    Delete,
    /// The backing device is out of space.
    #[error("disk full")]
    DiskFull,
    /// The process lacks permission for the backing store.
    #[error("permission denied")]
    PermissionDenied,
    /// A transaction lost a conflict race and was rolled back.
    #[error("transaction conflict")]
    TransactionConflict,
    /// The database file is locked by another holder.
    #[error("database locked")]
    DatabaseLocked,
}

impl PersistenceError {
    /// Whether a retry can reasonably succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict | Self::DatabaseLocked)
    }
}

/// Unified error type emitted by stores.
///
/// `Clone + PartialEq` so outcomes can flow through shared (coalesced)
/// futures and be asserted directly in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport failure while talking to the origin.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    /// Failure in the durable source of truth.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// The payload failed domain validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// No value exists for the key.
    #[error("no value for key {0}")]
    NotFound(StoreKey),
    /// Encoding or decoding between representations failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// The store was wired with an unusable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The origin asked us to slow down.
    #[error("rate limited")]
    RateLimited {
        /// Origin-provided wait hint, if any.
        retry_after: Option<Duration>,
    },
    /// Anything that could not be classified.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Whether a retry can reasonably succeed without intervention.
    ///
    /// Timeouts, connectivity loss, DNS failures, 408/429/5xx responses,
    /// transaction conflicts, lock contention, rate limits, and unknown
    /// errors are retryable. Validation, serialization, configuration,
    /// not-found, TLS, and hard persistence failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Persistence(e) => e.is_retryable(),
            Self::RateLimited { .. } | Self::Unknown(_) => true,
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => false,
        }
    }
}
