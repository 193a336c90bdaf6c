//! Read pipeline: stream, get, invalidate.
//!
//! Per subscriber, the pipeline snapshots the source of truth, plans a
//! fetch, runs the fetch inline (must-be-fresh) or as an abort-on-drop
//! child task, and then forwards every row the source of truth emits.
//! Fetched bodies are written back through the per-key mutex, so the
//! subscriber observes them through the same reactive reader as local
//! mutations. Dropping the subscriber tears down its driver and its fetch
//! task; if that fetch was the last waiter of a coalesced flight, the
//! flight itself is cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use stratum_core::{
    plan, ClockSource, EntityMeta, FetchPlan, Freshness, Namespace, PlanContext, StoreError,
    StoreKey,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::task::AbortOnDropHandle;

use crate::bookkeeping::Bookkeeper;
use crate::cache::MemoryCache;
use crate::concurrency::{KeyMutex, SingleFlight};
use crate::config::StoreConfig;
use crate::contract::{
    ConditionalHints, Converter, FetchRequest, Fetcher, FetcherResult, SourceOfTruth,
};
use crate::mutation::alias::KeyAliasMap;
use crate::mutation::tombstone::TombstoneMap;
use crate::read::result::{Origin, StoreResult};

/// Terminal state of one coalesced fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    /// At least one full response was written to the source of truth.
    Fresh,
    /// The origin confirmed the cached value (or the fetcher emitted
    /// nothing); only bookkeeping changed.
    NotModified,
}

/// Read side of a store: reactive streams, suspending gets, invalidation.
///
/// Cheap to clone; clones share every internal structure.
pub struct ReadStore<Domain, Net, Rd, Wr> {
    inner: Arc<ReadInner<Domain, Net, Rd, Wr>>,
}

impl<Domain, Net, Rd, Wr> Clone for ReadStore<Domain, Net, Rd, Wr> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct ReadInner<Domain, Net, Rd, Wr> {
    pub(crate) sot: Arc<dyn SourceOfTruth<Rd, Wr>>,
    fetcher: Arc<dyn Fetcher<Net>>,
    pub(crate) converter: Arc<dyn Converter<Domain, Rd, Net, Wr>>,
    pub(crate) clock: Arc<dyn ClockSource>,
    pub(crate) config: StoreConfig,
    pub(crate) cache: MemoryCache<StoreKey, Domain>,
    pub(crate) bookkeeper: Bookkeeper,
    flights: SingleFlight<Result<FetchOutcome, StoreError>>,
    pub(crate) key_locks: KeyMutex,
    pub(crate) aliases: KeyAliasMap,
    pub(crate) tombstones: TombstoneMap,
    shutdown: watch::Sender<bool>,
}

impl<Domain, Net, Rd, Wr> ReadStore<Domain, Net, Rd, Wr>
where
    Domain: Clone + Send + Sync + 'static,
    Net: Send + 'static,
    Rd: Send + 'static,
    Wr: Send + 'static,
{
    /// Wires a read store from its collaborators.
    #[must_use]
    pub fn new(
        sot: Arc<dyn SourceOfTruth<Rd, Wr>>,
        fetcher: Arc<dyn Fetcher<Net>>,
        converter: Arc<dyn Converter<Domain, Rd, Net, Wr>>,
        clock: Arc<dyn ClockSource>,
        config: StoreConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let cache = MemoryCache::new(config.cache_max_size, config.cache_ttl, Arc::clone(&clock));
        Self {
            inner: Arc::new(ReadInner {
                sot,
                fetcher,
                converter,
                clock,
                config,
                cache,
                bookkeeper: Bookkeeper::new(),
                flights: SingleFlight::new(),
                key_locks: KeyMutex::new(),
                aliases: KeyAliasMap::new(),
                tombstones: TombstoneMap::new(),
                shutdown,
            }),
        }
    }

    /// Opens a reactive stream of results for `key`.
    ///
    /// The stream stays open until the subscriber drops it (or the store
    /// closes); dropping it cancels the subscriber's background fetch.
    /// Under [`Freshness::MustBeFresh`] a fetch failure is emitted as a
    /// non-stale error and the stream completes.
    pub fn stream(
        &self,
        key: &StoreKey,
        freshness: Freshness,
    ) -> BoxStream<'static, StoreResult<Domain>> {
        let inner = Arc::clone(&self.inner);
        if *inner.shutdown.borrow() {
            return stream::empty().boxed();
        }
        let key = inner.aliases.resolve(key);
        let (tx, rx) = mpsc::channel(16);
        let mut shutdown = inner.shutdown.subscribe();

        tokio::spawn(async move {
            let driver = Arc::clone(&inner).drive_subscriber(key, freshness, tx.clone());
            tokio::select! {
                () = driver => {}
                _ = shutdown.changed() => {}
                () = tx.closed() => {}
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    /// Returns one value for `key` at the requested freshness.
    ///
    /// Under [`Freshness::CachedOrFetch`] a memory cache hit short-circuits
    /// the pipeline. Otherwise the first data item wins; stale-served
    /// errors are skipped (the stale data precedes them) and the first
    /// non-stale error is raised.
    ///
    /// # Errors
    ///
    /// The cause of the first terminal failure, or
    /// [`StoreError::NotFound`] if the stream ends without data.
    pub async fn get(&self, key: &StoreKey, freshness: Freshness) -> Result<Domain, StoreError> {
        let key = self.inner.aliases.resolve(key);
        if matches!(freshness, Freshness::CachedOrFetch) {
            if let Some(value) = self.inner.cache.get(&key) {
                tracing::trace!(key = %key, origin = ?Origin::Memory, "served from memory");
                return Ok(value);
            }
        }

        let mut results = self.stream(&key, freshness);
        while let Some(item) = results.next().await {
            match item {
                StoreResult::Data { value, .. } => return Ok(value),
                StoreResult::Error {
                    kind,
                    served_stale: false,
                } => return Err(kind),
                StoreResult::Loading { .. } | StoreResult::Error { .. } => {}
            }
        }
        Err(StoreError::NotFound(key))
    }

    /// Purges `key` from the memory cache and bookkeeping, waiting for any
    /// write currently holding the key mutex to finish first.
    ///
    /// When `delete_sot_on_invalidate` is set the row is also removed from
    /// the source of truth.
    pub async fn invalidate(&self, key: &StoreKey) {
        let key = self.inner.aliases.resolve(key);
        let lock = self.inner.key_locks.for_key(&key);
        let _guard = lock.lock().await;

        self.inner.cache.remove(&key);
        self.inner.bookkeeper.clear(&key);
        if self.inner.config.delete_sot_on_invalidate {
            if let Err(cause) = self.inner.sot.delete(&key).await {
                tracing::warn!(key = %key, %cause, "invalidate could not delete sot row");
            }
        }
        tracing::debug!(key = %key, "invalidated");
    }

    /// Purges every cached entry and status whose key lives in `namespace`.
    ///
    /// Prefix-matched: keys in other namespaces are untouched.
    pub fn invalidate_namespace(&self, namespace: &Namespace) {
        self.inner.cache.retain(|key| key.namespace() != namespace);
        self.inner.bookkeeper.clear_namespace(namespace);
        tracing::debug!(%namespace, "invalidated namespace");
    }

    /// Purges the entire memory cache and all bookkeeping.
    pub fn invalidate_all(&self) {
        self.inner.cache.clear();
        self.inner.bookkeeper.clear_all();
    }

    /// Closes the store: every live subscriber stream completes and its
    /// background work is cancelled. Subsequent streams complete
    /// immediately.
    pub fn close(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    pub(crate) fn inner(&self) -> &Arc<ReadInner<Domain, Net, Rd, Wr>> {
        &self.inner
    }
}

impl<Domain, Net, Rd, Wr> ReadInner<Domain, Net, Rd, Wr>
where
    Domain: Clone + Send + Sync + 'static,
    Net: Send + 'static,
    Rd: Send + 'static,
    Wr: Send + 'static,
{
    /// One subscriber's driver: snapshot, plan, fetch, forward.
    async fn drive_subscriber(
        self: Arc<Self>,
        key: StoreKey,
        freshness: Freshness,
        tx: mpsc::Sender<StoreResult<Domain>>,
    ) {
        let mut reader = self.sot.reader(&key);
        let mut initial = reader.next().await.flatten();
        let now_ms = self.clock.now_ms();
        if initial.is_some() && self.tombstones.is_active(&key, now_ms) {
            initial = None;
        }

        let db_meta = initial
            .as_ref()
            .and_then(|row| self.converter.meta_from_read(row));
        let status = self.bookkeeper.last_status(&key);
        let fetch_plan = plan(&PlanContext {
            now_ms,
            policy: &freshness,
            ttl: self.config.ttl,
            stale_if_error_window: self.config.stale_if_error_window,
            sot_meta: db_meta.as_ref(),
            status: &status,
        });
        tracing::debug!(key = %key, plan = ?fetch_plan, "planned read");

        let (fetch_tx, mut fetch_rx) = mpsc::channel::<Result<FetchOutcome, StoreError>>(4);
        let mut fetch_task = None;
        match &fetch_plan {
            FetchPlan::Skip => {
                if initial.is_none() {
                    // Skip with no row only happens inside a backoff window;
                    // surface it so suspending readers are not left hanging.
                    let kind = StoreError::RateLimited { retry_after: None };
                    let _ = tx
                        .send(StoreResult::Error {
                            kind,
                            served_stale: false,
                        })
                        .await;
                    return;
                }
            }
            _ if matches!(freshness, Freshness::MustBeFresh) => {
                // Inline: the stream does not start until the origin answers.
                match Arc::clone(&self).run_fetch(&key, fetch_plan.clone()).await {
                    Ok(FetchOutcome::Fresh) => {
                        // The fresh row arrives through the reader below;
                        // the pre-fetch snapshot must not be served.
                        initial = None;
                    }
                    Ok(FetchOutcome::NotModified) => {
                        if initial.is_none() {
                            // Nothing cached and nothing written: the
                            // entity does not exist at the origin either.
                            let _ = tx
                                .send(StoreResult::Error {
                                    kind: StoreError::NotFound(key.clone()),
                                    served_stale: false,
                                })
                                .await;
                            return;
                        }
                    }
                    Err(kind) => {
                        let _ = tx
                            .send(StoreResult::Error {
                                kind,
                                served_stale: false,
                            })
                            .await;
                        return;
                    }
                }
            }
            _ => {
                let this = Arc::clone(&self);
                let fetch_key = key.clone();
                let background_plan = fetch_plan.clone();
                let fetch_tx = fetch_tx.clone();
                fetch_task = Some(AbortOnDropHandle::new(tokio::spawn(async move {
                    let outcome = this.run_fetch(&fetch_key, background_plan).await;
                    let _ = fetch_tx.send(outcome).await;
                })));
            }
        }
        // The driver keeps only the receiver; the channel closes once the
        // fetch task (if any) finishes.
        drop(fetch_tx);
        let _fetch_task = fetch_task;

        let mut latest_meta = db_meta;
        let mut has_data = false;

        match initial {
            Some(row) => {
                if !self
                    .emit_row(&key, row, &mut latest_meta, &mut has_data, &tx)
                    .await
                {
                    return;
                }
            }
            None => {
                if tx
                    .send(StoreResult::Loading { from_cache: false })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }

        let mut fetch_open = true;
        loop {
            tokio::select! {
                next = reader.next() => match next {
                    Some(Some(row)) => {
                        if self.tombstones.is_active(&key, self.clock.now_ms()) {
                            continue;
                        }
                        if !self
                            .emit_row(&key, row, &mut latest_meta, &mut has_data, &tx)
                            .await
                        {
                            return;
                        }
                    }
                    // A deletion; there is nothing to forward.
                    Some(None) => {}
                    // The reader closed underneath us.
                    None => return,
                },
                finished = fetch_rx.recv(), if fetch_open => match finished {
                    Some(Err(kind)) => {
                        let served_stale =
                            self.serves_stale(&key, has_data, &freshness, latest_meta.as_ref());
                        if tx
                            .send(StoreResult::Error { kind, served_stale })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(FetchOutcome::NotModified)) if !has_data => {
                        // The fetch finished without writing and there is no
                        // row to serve: report absence so suspending readers
                        // are not left hanging.
                        if tx
                            .send(StoreResult::Error {
                                kind: StoreError::NotFound(key.clone()),
                                served_stale: false,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(_)) => {}
                    None => fetch_open = false,
                },
            }
        }
    }

    /// Converts and emits one row, refreshing the memory cache.
    ///
    /// Returns `false` when the stream must terminate (subscriber gone, or
    /// a conversion failure with no previously served data).
    async fn emit_row(
        &self,
        key: &StoreKey,
        row: Rd,
        latest_meta: &mut Option<EntityMeta>,
        has_data: &mut bool,
        tx: &mpsc::Sender<StoreResult<Domain>>,
    ) -> bool {
        let meta = self.converter.meta_from_read(&row);
        match self.converter.read_to_domain(key, row) {
            Ok(value) => {
                let now_ms = self.clock.now_ms();
                // A row without metadata counts as epoch-old.
                let updated_at_ms = meta.as_ref().map_or(0, |m| m.updated_at_ms);
                let age = Duration::from_millis(now_ms.saturating_sub(updated_at_ms));
                self.cache.put(key.clone(), value.clone());
                *latest_meta = meta;
                *has_data = true;
                tx.send(StoreResult::Data {
                    value,
                    origin: Origin::Sot,
                    age,
                })
                .await
                .is_ok()
            }
            Err(kind) => {
                let served_stale = *has_data;
                let sent = tx
                    .send(StoreResult::Error { kind, served_stale })
                    .await
                    .is_ok();
                sent && served_stale
            }
        }
    }

    /// Runs (or joins) the coalesced fetch for `key`.
    pub(crate) async fn run_fetch(
        self: Arc<Self>,
        key: &StoreKey,
        fetch_plan: FetchPlan,
    ) -> Result<FetchOutcome, StoreError> {
        let request = match fetch_plan {
            FetchPlan::Skip => return Ok(FetchOutcome::NotModified),
            FetchPlan::Unconditional => FetchRequest::default(),
            FetchPlan::Conditional {
                etag,
                last_modified_ms,
                max_stale,
            } => FetchRequest {
                conditional: Some(ConditionalHints {
                    etag,
                    last_modified_ms,
                    max_stale,
                }),
                ..FetchRequest::default()
            },
        };

        let this = Arc::clone(&self);
        let fetch_key = key.clone();
        let flight = self
            .flights
            .launch(key, move || this.fetch_once(fetch_key, request));
        flight.await
    }

    /// The single-flight body: iterate fetch outcomes, write successes to
    /// the source of truth under the key mutex, keep the books.
    async fn fetch_once(
        self: Arc<Self>,
        key: StoreKey,
        request: FetchRequest,
    ) -> Result<FetchOutcome, StoreError> {
        tracing::debug!(key = %key, conditional = request.conditional.is_some(), "fetching");
        let mut results = self.fetcher.fetch(&key, request);
        let mut outcome = FetchOutcome::NotModified;

        while let Some(result) = results.next().await {
            match result {
                FetcherResult::Success { body, etag, .. } => {
                    if self.tombstones.is_active(&key, self.clock.now_ms()) {
                        tracing::debug!(key = %key, "dropping fetched row masked by tombstone");
                        continue;
                    }
                    let write = self.converter.net_to_write(&key, body);
                    {
                        let lock = self.key_locks.for_key(&key);
                        let _guard = lock.lock().await;
                        if let Err(cause) = self.sot.write(&key, write).await {
                            self.bookkeeper
                                .record_failure(&key, &cause, self.clock.now_ms());
                            return Err(cause);
                        }
                    }
                    self.bookkeeper
                        .record_success(&key, etag, self.clock.now_ms());
                    outcome = FetchOutcome::Fresh;
                }
                FetcherResult::NotModified { etag, .. } => {
                    self.bookkeeper
                        .record_success(&key, etag, self.clock.now_ms());
                }
                FetcherResult::Error(cause) => {
                    self.bookkeeper
                        .record_failure(&key, &cause, self.clock.now_ms());
                    return Err(cause);
                }
            }
        }
        Ok(outcome)
    }

    /// Whether an error arriving now accompanies still-servable stale data.
    fn serves_stale(
        &self,
        key: &StoreKey,
        has_data: bool,
        freshness: &Freshness,
        latest_meta: Option<&EntityMeta>,
    ) -> bool {
        if !has_data || matches!(freshness, Freshness::MustBeFresh) {
            return false;
        }
        let Some(window) = self.config.stale_if_error_window else {
            return true;
        };

        let status = self.bookkeeper.last_status(key);
        let reference = latest_meta
            .map(|meta| meta.updated_at_ms)
            .into_iter()
            .chain(status.last_success_at_ms)
            .max();
        match reference {
            #[allow(clippy::cast_possible_truncation)]
            Some(at_ms) => {
                self.clock.now_ms().saturating_sub(at_ms) <= window.as_millis() as u64
            }
            None => false,
        }
    }
}
