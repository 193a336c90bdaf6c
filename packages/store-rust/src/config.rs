//! Store configuration.

use std::time::Duration;

use stratum_core::Namespace;

/// Tuning knobs for a read store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a persisted row counts as fresh under
    /// [`Freshness::CachedOrFetch`](stratum_core::Freshness::CachedOrFetch).
    /// `None` means rows never age out.
    pub ttl: Option<Duration>,
    /// Window within which stale data may be served alongside a fetch
    /// error. `None` means stale data is served regardless of age.
    pub stale_if_error_window: Option<Duration>,
    /// Bound on the in-process memory cache.
    pub cache_max_size: usize,
    /// Time-to-live for memory cache entries. `None` disables expiry.
    pub cache_ttl: Option<Duration>,
    /// Whether `invalidate(key)` also deletes the row from the source of
    /// truth. The default only purges the in-process caches.
    pub delete_sot_on_invalidate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            stale_if_error_window: None,
            cache_max_size: 100,
            cache_ttl: None,
            delete_sot_on_invalidate: false,
        }
    }
}

/// Identity configuration for a mutation store.
///
/// Keys minted for created entities live in this namespace under this
/// entity type.
#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// Namespace for minted keys.
    pub namespace: Namespace,
    /// Entity type for minted keys.
    pub entity_type: String,
}

impl MutationConfig {
    /// Creates a mutation config.
    pub fn new(namespace: impl Into<Namespace>, entity_type: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity_type: entity_type.into(),
        }
    }
}
