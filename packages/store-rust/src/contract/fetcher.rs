//! Remote read contract.
//!
//! A [`Fetcher`] answers a key with a lazy sequence of outcomes: exactly one
//! for request/response transports, many for streaming transports. The
//! store passes conditional hints (etag, last-modified, max-stale) through
//! unmodified; their interpretation belongs to the transport.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use stratum_core::{StoreError, StoreKey};

/// How urgently the caller needs the response.
///
/// Passed through to the transport for prioritization; the store itself
/// never reorders work based on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchUrgency {
    /// Prefetch or background refresh.
    Low,
    /// Ordinary read.
    #[default]
    Normal,
    /// A caller is blocked on this response.
    High,
}

/// Revalidation hints forwarded to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionalHints {
    /// Validator from the persisted row or the last response.
    pub etag: Option<String>,
    /// Last modification instant of the persisted row.
    pub last_modified_ms: Option<u64>,
    /// Staleness the caller tolerates on error, if bounded.
    pub max_stale: Option<Duration>,
}

/// One remote read request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    /// Hints for a conditional request; `None` requests a full response.
    pub conditional: Option<ConditionalHints>,
    /// Transport priority hint.
    pub urgency: FetchUrgency,
}

/// One outcome in a fetch sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherResult<Net> {
    /// The origin returned a full body.
    Success {
        /// Network representation of the value.
        body: Net,
        /// Validator for future conditional requests.
        etag: Option<String>,
        /// Origin-reported last modification instant.
        last_modified_ms: Option<u64>,
        /// Raw cache-control directive, passed through opaquely.
        cache_control: Option<String>,
    },
    /// The origin confirmed the cached value is still current.
    NotModified {
        /// Possibly refreshed validator.
        etag: Option<String>,
        /// Possibly refreshed last modification instant.
        last_modified_ms: Option<u64>,
    },
    /// The fetch failed.
    Error(StoreError),
}

/// Remote read side of a store.
///
/// Used as `Arc<dyn Fetcher<Net>>`.
pub trait Fetcher<Net>: Send + Sync {
    /// Starts a fetch for `key`, returning a lazy sequence of outcomes.
    ///
    /// One-shot transports emit a single item; streaming transports may
    /// emit many. The sequence ends when the transport is done.
    fn fetch(&self, key: &StoreKey, request: FetchRequest) -> BoxStream<'static, FetcherResult<Net>>;
}

/// Adapts an async closure into a one-shot [`Fetcher`].
pub struct FnFetcher<F> {
    fetch: F,
}

impl<F> FnFetcher<F> {
    /// Wraps `fetch`; each call to [`Fetcher::fetch`] invokes it once.
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<Net, F, Fut> Fetcher<Net> for FnFetcher<F>
where
    Net: Send + 'static,
    F: Fn(StoreKey, FetchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = FetcherResult<Net>> + Send + 'static,
{
    fn fetch(&self, key: &StoreKey, request: FetchRequest) -> BoxStream<'static, FetcherResult<Net>> {
        stream::once((self.fetch)(key.clone(), request)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_fetcher_emits_exactly_one_item() {
        let fetcher = FnFetcher::new(|key: StoreKey, _request| async move {
            FetcherResult::Success {
                body: format!("payload for {key}"),
                etag: Some("v1".to_string()),
                last_modified_ms: None,
                cache_control: None,
            }
        });

        let key = StoreKey::by_id("app", "user", "1");
        let mut results = fetcher.fetch(&key, FetchRequest::default());

        let first = results.next().await.expect("one item");
        assert!(matches!(first, FetcherResult::Success { .. }));
        assert!(results.next().await.is_none());
    }

    #[test]
    fn request_default_is_unconditional_normal() {
        let request = FetchRequest::default();
        assert!(request.conditional.is_none());
        assert_eq!(request.urgency, FetchUrgency::Normal);
    }
}
