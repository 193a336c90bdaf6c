//! Items emitted to read-side subscribers.

use std::time::Duration;

use stratum_core::StoreError;

/// Where an emitted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The in-process memory cache.
    Memory,
    /// The durable source of truth (the normal path: fetched values land
    /// in the source of truth and are re-read from it).
    Sot,
    /// Straight from the network. Reserved for memory-only configurations
    /// that short-circuit the source of truth.
    Network,
}

/// One item in a subscriber's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreResult<V> {
    /// No data yet; a fetch may be underway.
    Loading {
        /// Whether cached data exists elsewhere (always `false` from the
        /// shipped pipeline, which emits data instead when any exists).
        from_cache: bool,
    },
    /// A value.
    Data {
        /// The domain value.
        value: V,
        /// Which layer produced it.
        origin: Origin,
        /// Age of the value at emission time.
        age: Duration,
    },
    /// A failure that did not necessarily end the stream.
    Error {
        /// Classified cause.
        kind: StoreError,
        /// `true` when cached data was served despite this failure.
        served_stale: bool,
    },
}

impl<V> StoreResult<V> {
    /// Returns the value when this item carries data.
    pub fn into_data(self) -> Option<V> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Loading { .. } | Self::Error { .. } => None,
        }
    }

    /// Whether this item carries data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}
