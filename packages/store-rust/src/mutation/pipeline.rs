//! Mutation pipeline: update, create, delete, upsert, replace.
//!
//! Each verb encodes its payload, optionally applies an optimistic local
//! write through the per-key mutex, pushes to the matching remote client,
//! and classifies the outcome into a typed result. Creates that come back
//! with a server-assigned key are rekeyed atomically and the provisional
//! key becomes an alias of the canonical one.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{BoxStream, StreamExt};
use stratum_core::{
    FetchPlan, Freshness, Namespace, NetworkError, StoreError, StoreKey,
};
use uuid::Uuid;

use crate::concurrency::SingleFlight;
use crate::config::MutationConfig;
use crate::contract::{
    Creator, Deleter, MutationContext, MutationEncoder, Precondition, PushOutcome, Putser,
    ReconcileFn, Updater,
};
use crate::mutation::outcome::{
    CreateResult, DeleteResult, ReplaceResult, UpdateResult, UpsertResult,
};
use crate::mutation::policy::{
    ConflictStrategy, CreatePolicy, DeletePolicy, ExistenceStrategy, IdStrategy,
    IdempotencyStrategy, ReplacePolicy, TombstonePolicy, UpdatePolicy, UpsertPolicy, WriteMode,
};
use crate::read::pipeline::{ReadInner, ReadStore};
use crate::read::result::StoreResult;

/// The four remote clients a mutation store pushes through.
pub struct RemoteClients<Net> {
    /// Partial updates (PATCH in spirit).
    pub updater: Arc<dyn Updater<Net>>,
    /// Creations (POST in spirit).
    pub creator: Arc<dyn Creator<Net>>,
    /// Deletions (DELETE in spirit).
    pub deleter: Arc<dyn Deleter<Net>>,
    /// Full-value writes (PUT in spirit).
    pub putser: Arc<dyn Putser<Net>>,
}

/// Read store plus the five mutation verbs.
///
/// Cheap to clone; clones share every internal structure, including the
/// wrapped [`ReadStore`].
pub struct MutationStore<Domain, Net, Rd, Wr, Patch, Draft> {
    inner: Arc<MutationInner<Domain, Net, Rd, Wr, Patch, Draft>>,
}

impl<Domain, Net, Rd, Wr, Patch, Draft> Clone
    for MutationStore<Domain, Net, Rd, Wr, Patch, Draft>
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MutationInner<Domain, Net, Rd, Wr, Patch, Draft> {
    read: ReadStore<Domain, Net, Rd, Wr>,
    encoder: Arc<dyn MutationEncoder<Domain, Patch, Draft, Net>>,
    updater: Arc<dyn Updater<Net>>,
    creator: Arc<dyn Creator<Net>>,
    deleter: Arc<dyn Deleter<Net>>,
    putser: Arc<dyn Putser<Net>>,
    config: MutationConfig,
    update_flights: SingleFlight<UpdateResult>,
    recent_updates: DashMap<StoreKey, (u64, UpdateResult)>,
}

/// A remote conflict, carried in the HTTP idiom the verbs map onto.
fn conflict_cause(server_tag: Option<String>) -> StoreError {
    StoreError::Network(NetworkError::Http {
        status: 409,
        body: server_tag,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl<Domain, Net, Rd, Wr, Patch, Draft> MutationStore<Domain, Net, Rd, Wr, Patch, Draft>
where
    Domain: Clone + Send + Sync + 'static,
    Net: Clone + Send + Sync + 'static,
    Rd: Clone + Send + Sync + 'static,
    Wr: Send + Sync + 'static,
    Patch: Send + Sync + 'static,
    Draft: Send + Sync + 'static,
{
    /// Wires a mutation store around an existing read store.
    #[must_use]
    pub fn new(
        read: ReadStore<Domain, Net, Rd, Wr>,
        clients: RemoteClients<Net>,
        encoder: Arc<dyn MutationEncoder<Domain, Patch, Draft, Net>>,
        config: MutationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MutationInner {
                read,
                encoder,
                updater: clients.updater,
                creator: clients.creator,
                deleter: clients.deleter,
                putser: clients.putser,
                config,
                update_flights: SingleFlight::new(),
                recent_updates: DashMap::new(),
            }),
        }
    }

    /// The wrapped read store.
    #[must_use]
    pub fn read_store(&self) -> &ReadStore<Domain, Net, Rd, Wr> {
        &self.inner.read
    }

    /// See [`ReadStore::stream`].
    pub fn stream(
        &self,
        key: &StoreKey,
        freshness: Freshness,
    ) -> BoxStream<'static, StoreResult<Domain>> {
        self.inner.read.stream(key, freshness)
    }

    /// See [`ReadStore::get`].
    ///
    /// # Errors
    ///
    /// Propagates the read store's failure.
    pub async fn get(&self, key: &StoreKey, freshness: Freshness) -> Result<Domain, StoreError> {
        self.inner.read.get(key, freshness).await
    }

    /// See [`ReadStore::invalidate`].
    pub async fn invalidate(&self, key: &StoreKey) {
        self.inner.read.invalidate(key).await;
    }

    /// See [`ReadStore::invalidate_namespace`].
    pub fn invalidate_namespace(&self, namespace: &Namespace) {
        self.inner.read.invalidate_namespace(namespace);
    }

    /// See [`ReadStore::invalidate_all`].
    pub fn invalidate_all(&self) {
        self.inner.read.invalidate_all();
    }

    /// See [`ReadStore::close`].
    pub fn close(&self) {
        self.inner.read.close();
    }

    /// Applies a partial update to `key`.
    ///
    /// Overlapping calls for one key coalesce onto the in-flight push; a
    /// call arriving within the policy's dedupe window of a completed
    /// update reuses that update's outcome without a second round-trip.
    pub async fn update(&self, key: &StoreKey, patch: Patch, policy: UpdatePolicy) -> UpdateResult {
        let inner = Arc::clone(&self.inner);
        let read = inner.read.inner();
        let key = read.aliases.resolve(key);
        let now_ms = read.clock.now_ms();

        if !policy.dedupe_window.is_zero() {
            if let Some(entry) = inner.recent_updates.get(&key) {
                let (at_ms, result) = entry.value().clone();
                if now_ms.saturating_sub(at_ms) < duration_ms(policy.dedupe_window) {
                    tracing::debug!(key = %key, "deduplicated update");
                    return result;
                }
            }
        }

        let this = Arc::clone(&inner);
        let flight_key = key.clone();
        let flight_policy = policy.clone();
        let flight = inner
            .update_flights
            .launch(&key, move || this.run_update(flight_key, patch, flight_policy));
        let result = flight.await;

        let completed_at = inner.read.inner().clock.now_ms();
        inner
            .recent_updates
            .insert(key, (completed_at, result.clone()));
        result
    }

    /// Creates an entity from `draft`.
    pub async fn create(&self, draft: Draft, policy: CreatePolicy<Draft>) -> CreateResult {
        self.inner.run_create(draft, policy).await
    }

    /// Deletes the entity under `key`.
    pub async fn delete(&self, key: &StoreKey, policy: DeletePolicy) -> DeleteResult {
        let key = self.inner.read.inner().aliases.resolve(key);
        self.inner.run_delete(key, policy).await
    }

    /// Writes `value` under `key`, creating or updating as the origin sees
    /// fit.
    pub async fn upsert(&self, key: &StoreKey, value: Domain, policy: UpsertPolicy) -> UpsertResult {
        let key = self.inner.read.inner().aliases.resolve(key);
        self.inner.run_upsert(key, value, policy).await
    }

    /// Replaces the full value under `key`.
    pub async fn replace(
        &self,
        key: &StoreKey,
        value: Domain,
        policy: ReplacePolicy,
    ) -> ReplaceResult {
        let key = self.inner.read.inner().aliases.resolve(key);
        self.inner.run_replace(key, value, policy).await
    }
}

impl<Domain, Net, Rd, Wr, Patch, Draft> MutationInner<Domain, Net, Rd, Wr, Patch, Draft>
where
    Domain: Clone + Send + Sync + 'static,
    Net: Clone + Send + Sync + 'static,
    Rd: Clone + Send + Sync + 'static,
    Wr: Send + Sync + 'static,
    Patch: Send + Sync + 'static,
    Draft: Send + Sync + 'static,
{
    fn read(&self) -> &Arc<ReadInner<Domain, Net, Rd, Wr>> {
        self.read.inner()
    }

    /// Current projection under `key`, read through the reactive reader.
    async fn current_row(&self, key: &StoreKey) -> Option<Rd> {
        self.read().sot.reader(key).next().await.flatten()
    }

    /// Optimistic local write: value into the source of truth (under the
    /// key mutex) and the memory cache.
    async fn write_local(&self, key: &StoreKey, value: Domain) {
        let read = self.read();
        let write = read.converter.domain_to_write(key, value.clone());
        {
            let lock = read.key_locks.for_key(key);
            let _guard = lock.lock().await;
            if let Err(cause) = read.sot.write(key, write).await {
                tracing::warn!(key = %key, %cause, "optimistic write failed");
                return;
            }
        }
        read.cache.put(key.clone(), value);
    }

    /// Drops the local row (failed online-first create, reverted create).
    async fn discard_local(&self, key: &StoreKey) {
        let read = self.read();
        {
            let lock = read.key_locks.for_key(key);
            let _guard = lock.lock().await;
            if let Err(cause) = read.sot.delete(key).await {
                tracing::warn!(key = %key, %cause, "could not discard local row");
            }
        }
        read.cache.remove(key);
    }

    /// Writes the canonical post-mutation value: the origin's echo when it
    /// sent one, otherwise the supplied fallback.
    async fn commit_canonical(&self, key: &StoreKey, echo: Option<Net>, fallback: Option<Domain>) {
        let read = self.read();
        let write = match echo {
            Some(net) => Some(read.converter.net_to_write(key, net)),
            None => fallback.map(|value| read.converter.domain_to_write(key, value)),
        };
        if let Some(write) = write {
            let lock = read.key_locks.for_key(key);
            let _guard = lock.lock().await;
            if let Err(cause) = read.sot.write(key, write).await {
                tracing::warn!(key = %key, %cause, "canonical write failed");
            }
        }
    }

    /// Writes the pre-mutation row back after a failed optimistic write.
    ///
    /// Returns whether the restore took effect.
    async fn restore_prior(&self, key: &StoreKey, prior: Option<Rd>, wrote: bool) -> bool {
        if !wrote {
            return false;
        }
        let read = self.read();
        match prior {
            Some(row) => match read.converter.read_to_domain(key, row) {
                Ok(value) => {
                    let write = read.converter.domain_to_write(key, value.clone());
                    let restored = {
                        let lock = read.key_locks.for_key(key);
                        let _guard = lock.lock().await;
                        read.sot.write(key, write).await.is_ok()
                    };
                    if restored {
                        read.cache.put(key.clone(), value);
                    }
                    restored
                }
                Err(cause) => {
                    tracing::warn!(key = %key, %cause, "could not restore prior row");
                    false
                }
            },
            None => {
                self.discard_local(key).await;
                true
            }
        }
    }

    fn record_failure(&self, key: &StoreKey, cause: &StoreError, retry_after: Option<Duration>) {
        let read = self.read();
        let now_ms = read.clock.now_ms();
        read.bookkeeper.record_failure(key, cause, now_ms);
        if let Some(wait) = retry_after {
            read.bookkeeper
                .set_backoff(key, now_ms.saturating_add(duration_ms(wait)));
        }
    }

    // --- update ---

    async fn run_update(
        self: Arc<Self>,
        key: StoreKey,
        patch: Patch,
        policy: UpdatePolicy,
    ) -> UpdateResult {
        let read = Arc::clone(self.read());
        let body = self.encoder.patch_to_net(&key, &patch);
        let prior = self.current_row(&key).await;

        let mut optimistic: Option<Domain> = None;
        let current = prior
            .clone()
            .and_then(|row| read.converter.read_to_domain(&key, row).ok());
        if let Some(current) = current {
            if let Some(next) = self.encoder.apply_patch(current, &patch) {
                self.write_local(&key, next.clone()).await;
                optimistic = Some(next);
            }
        }

        let ctx = MutationContext {
            precondition: policy.precondition.clone(),
            ..MutationContext::default()
        };
        let outcome = self.updater.update(&key, body.clone(), &ctx).await;
        let now_ms = read.clock.now_ms();

        match outcome {
            PushOutcome::Success { echo, etag, .. } => {
                self.commit_canonical(&key, echo, optimistic).await;
                read.bookkeeper.record_success(&key, etag, now_ms);
                UpdateResult::Synced
            }
            PushOutcome::NotModified => {
                read.bookkeeper.record_success(&key, None, now_ms);
                UpdateResult::Synced
            }
            PushOutcome::Conflict { server_tag } => {
                self.resolve_update_conflict(&key, body, prior, optimistic, server_tag, &policy)
                    .await
            }
            PushOutcome::Failure { cause, retry_after } => {
                self.record_failure(&key, &cause, retry_after);
                if policy.require_online {
                    self.restore_prior(&key, prior, optimistic.is_some()).await;
                    UpdateResult::Failed { cause }
                } else {
                    UpdateResult::Enqueued
                }
            }
        }
    }

    async fn resolve_update_conflict(
        &self,
        key: &StoreKey,
        body: Option<Net>,
        prior: Option<Rd>,
        optimistic: Option<Domain>,
        server_tag: Option<String>,
        policy: &UpdatePolicy,
    ) -> UpdateResult {
        let read = self.read();
        match policy.conflict_strategy {
            ConflictStrategy::ServerWins => {
                // Surface the server's version, then report the conflict.
                if let Err(cause) = Arc::clone(read).run_fetch(key, FetchPlan::Unconditional).await {
                    tracing::debug!(key = %key, %cause, "conflict refetch failed");
                }
                UpdateResult::Failed {
                    cause: conflict_cause(server_tag),
                }
            }
            ConflictStrategy::ClientWins => {
                let retry_ctx = MutationContext {
                    precondition: server_tag
                        .clone()
                        .map_or(Precondition::None, Precondition::IfMatch),
                    ..MutationContext::default()
                };
                match self.updater.update(key, body, &retry_ctx).await {
                    PushOutcome::Success { echo, etag, .. } => {
                        self.commit_canonical(key, echo, optimistic).await;
                        read.bookkeeper
                            .record_success(key, etag, read.clock.now_ms());
                        UpdateResult::Synced
                    }
                    PushOutcome::NotModified => {
                        read.bookkeeper
                            .record_success(key, None, read.clock.now_ms());
                        UpdateResult::Synced
                    }
                    PushOutcome::Conflict { server_tag } => UpdateResult::Failed {
                        cause: conflict_cause(server_tag),
                    },
                    PushOutcome::Failure { cause, retry_after } => {
                        self.record_failure(key, &cause, retry_after);
                        if policy.require_online {
                            self.restore_prior(key, prior, optimistic.is_some()).await;
                            UpdateResult::Failed { cause }
                        } else {
                            UpdateResult::Enqueued
                        }
                    }
                }
            }
            ConflictStrategy::Merge => UpdateResult::Failed {
                cause: conflict_cause(server_tag),
            },
        }
    }

    // --- create ---

    async fn run_create(
        &self,
        draft: Draft,
        policy: CreatePolicy<Draft>,
    ) -> CreateResult {
        let read = Arc::clone(self.read());

        let provisional = match &policy.id_strategy {
            IdStrategy::ProvisionalUuid => Some(self.minted_key(Uuid::new_v4().to_string())),
            IdStrategy::ContentHash(hash) => Some(self.minted_key(hash(&draft))),
            IdStrategy::ServerAllocated => None,
        };

        let mut wrote_local = false;
        if let Some(provisional_key) = &provisional {
            if matches!(policy.mode, WriteMode::OfflineFirst) {
                if let Some(row) = self.encoder.draft_to_domain(provisional_key, &draft) {
                    self.write_local(provisional_key, row).await;
                    wrote_local = true;
                }
            }
        }

        let idempotency_key = match policy.idempotency {
            IdempotencyStrategy::Auto => provisional
                .as_ref()
                .map(|key| format!("create-{:016x}", key.stable_hash())),
            IdempotencyStrategy::Explicit(value) => Some(value),
            IdempotencyStrategy::None => None,
        };
        let ctx = MutationContext {
            idempotency_key,
            ..MutationContext::default()
        };

        let body = self.encoder.draft_to_net(&draft);
        let outcome = self.creator.create(provisional.as_ref(), body, &ctx).await;
        let now_ms = read.clock.now_ms();

        match outcome {
            PushOutcome::Success {
                echo,
                canonical_key,
                etag,
                ..
            } => {
                let Some(canonical) = canonical_key.or_else(|| provisional.clone()) else {
                    return CreateResult::Failed {
                        provisional: None,
                        cause: StoreError::Configuration(
                            "origin returned no canonical key for a server-allocated create"
                                .to_string(),
                        ),
                    };
                };

                let mut rekeyed_from = None;
                if let Some(provisional_key) = &provisional {
                    if *provisional_key != canonical {
                        if wrote_local {
                            if let Err(cause) =
                                self.rekey_to_canonical(provisional_key, &canonical).await
                            {
                                return CreateResult::Failed {
                                    provisional: provisional.clone(),
                                    cause,
                                };
                            }
                        }
                        read.aliases
                            .record(provisional_key.clone(), canonical.clone());
                        rekeyed_from = Some(provisional_key.clone());
                    }
                }

                self.commit_canonical(&canonical, echo, None).await;
                read.bookkeeper.record_success(&canonical, etag, now_ms);
                read.tombstones.lift(&canonical);
                tracing::debug!(canonical = %canonical, rekeyed = rekeyed_from.is_some(), "create synced");
                CreateResult::Synced {
                    canonical,
                    rekeyed_from,
                }
            }
            PushOutcome::NotModified => match provisional {
                // The origin reports the entity already exists as submitted
                // (an idempotent replay).
                Some(canonical) => {
                    read.bookkeeper.record_success(&canonical, None, now_ms);
                    CreateResult::Synced {
                        canonical,
                        rekeyed_from: None,
                    }
                }
                None => CreateResult::Failed {
                    provisional: None,
                    cause: StoreError::Unknown(
                        "origin reported not-modified for a server-allocated create".to_string(),
                    ),
                },
            },
            PushOutcome::Conflict { server_tag } => {
                if wrote_local {
                    if let Some(provisional_key) = &provisional {
                        self.discard_local(provisional_key).await;
                    }
                }
                CreateResult::Failed {
                    provisional,
                    cause: conflict_cause(server_tag),
                }
            }
            PushOutcome::Failure { cause, retry_after } => {
                if let Some(provisional_key) = &provisional {
                    self.record_failure(provisional_key, &cause, retry_after);
                }
                if policy.require_online || matches!(policy.mode, WriteMode::OnlineFirst) {
                    if wrote_local {
                        if let Some(provisional_key) = &provisional {
                            self.discard_local(provisional_key).await;
                        }
                    }
                    CreateResult::Failed { provisional, cause }
                } else if let Some(provisional_key) = provisional {
                    CreateResult::Local {
                        provisional: provisional_key,
                    }
                } else {
                    CreateResult::Failed {
                        provisional: None,
                        cause,
                    }
                }
            }
        }
    }

    fn minted_key(&self, id: String) -> StoreKey {
        StoreKey::by_id(
            self.config.namespace.clone(),
            self.config.entity_type.clone(),
            id,
        )
    }

    /// Moves the local row from the provisional to the canonical key; the
    /// created row wins over anything already under the canonical key.
    async fn rekey_to_canonical(
        &self,
        provisional: &StoreKey,
        canonical: &StoreKey,
    ) -> Result<(), StoreError> {
        let read = self.read();
        let converter = Arc::clone(&read.converter);
        let target = canonical.clone();
        let reconcile: ReconcileFn<Rd, Wr> = Box::new(move |old, _existing| {
            let value = converter.read_to_domain(&target, old)?;
            Ok(converter.domain_to_write(&target, value))
        });
        read.sot.rekey(provisional, canonical, reconcile).await?;
        read.cache.remove(provisional);
        Ok(())
    }

    // --- delete ---

    async fn run_delete(&self, key: StoreKey, policy: DeletePolicy) -> DeleteResult {
        let read = Arc::clone(self.read());
        let prior = self.current_row(&key).await;
        let offline_first = matches!(policy.mode, WriteMode::OfflineFirst);

        if offline_first {
            self.apply_local_delete(&key, &policy).await;
        }

        let ctx = MutationContext {
            precondition: policy.precondition.clone(),
            ..MutationContext::default()
        };
        let outcome = self.deleter.delete(&key, &ctx).await;
        let now_ms = read.clock.now_ms();

        match outcome {
            PushOutcome::Success { .. } => {
                if !offline_first {
                    self.apply_local_delete(&key, &policy).await;
                }
                read.bookkeeper.record_success(&key, None, now_ms);
                DeleteResult::Synced {
                    already_deleted: false,
                }
            }
            PushOutcome::NotModified => {
                if !offline_first {
                    self.apply_local_delete(&key, &policy).await;
                }
                read.bookkeeper.record_success(&key, None, now_ms);
                DeleteResult::Synced {
                    already_deleted: true,
                }
            }
            PushOutcome::Failure { cause, .. } if matches!(cause, StoreError::NotFound(_)) => {
                if !offline_first {
                    self.apply_local_delete(&key, &policy).await;
                }
                read.bookkeeper.record_success(&key, None, now_ms);
                DeleteResult::Synced {
                    already_deleted: true,
                }
            }
            PushOutcome::Conflict { server_tag } => {
                let restored = self.restore_prior(&key, prior, offline_first).await;
                if restored {
                    read.tombstones.lift(&key);
                }
                DeleteResult::Failed {
                    cause: conflict_cause(server_tag),
                    restored,
                }
            }
            PushOutcome::Failure { cause, retry_after } => {
                self.record_failure(&key, &cause, retry_after);
                if policy.require_online {
                    let restored = self.restore_prior(&key, prior, offline_first).await;
                    if restored {
                        read.tombstones.lift(&key);
                    }
                    DeleteResult::Failed { cause, restored }
                } else {
                    DeleteResult::Enqueued
                }
            }
        }
    }

    async fn apply_local_delete(&self, key: &StoreKey, policy: &DeletePolicy) {
        let read = self.read();
        {
            let lock = read.key_locks.for_key(key);
            let _guard = lock.lock().await;
            if let Err(cause) = read.sot.delete(key).await {
                tracing::warn!(key = %key, %cause, "local delete failed");
            }
        }
        read.cache.remove(key);

        if let TombstonePolicy::Enabled { ttl } = policy.tombstone {
            let expires_at = read.clock.now_ms().saturating_add(duration_ms(ttl));
            read.tombstones.place(key.clone(), expires_at);
        }
        if policy.cascade_queries {
            let namespace = key.namespace().clone();
            read.cache.retain(|cached| {
                !(matches!(cached, StoreKey::Query { .. }) && *cached.namespace() == namespace)
            });
        }
    }

    // --- upsert ---

    async fn run_upsert(
        &self,
        key: StoreKey,
        value: Domain,
        policy: UpsertPolicy,
    ) -> UpsertResult {
        let read = Arc::clone(self.read());

        let existed_before = match policy.existence {
            ExistenceStrategy::ServerDecides => None,
            ExistenceStrategy::CheckSot => Some(self.current_row(&key).await.is_some()),
            ExistenceStrategy::CheckRemote => {
                let status = read.bookkeeper.last_status(&key);
                let check_plan = match status.last_etag {
                    Some(etag) => FetchPlan::Conditional {
                        etag: Some(etag),
                        last_modified_ms: None,
                        max_stale: None,
                    },
                    None => FetchPlan::Unconditional,
                };
                match Arc::clone(&read).run_fetch(&key, check_plan).await {
                    Ok(_) => Some(self.current_row(&key).await.is_some()),
                    Err(_) => None,
                }
            }
        };

        let offline_first = matches!(policy.mode, WriteMode::OfflineFirst);
        let prior = if offline_first {
            self.current_row(&key).await
        } else {
            None
        };
        if offline_first {
            self.write_local(&key, value.clone()).await;
        }

        let idempotency_key = match policy.idempotency {
            IdempotencyStrategy::Auto => Some(format!("upsert-{:016x}", key.stable_hash())),
            IdempotencyStrategy::Explicit(explicit) => Some(explicit),
            IdempotencyStrategy::None => None,
        };
        let ctx = MutationContext {
            precondition: policy.precondition.clone(),
            idempotency_key,
            ..MutationContext::default()
        };

        let body = self.encoder.value_to_net(&key, &value);
        let outcome = self.putser.put(&key, body, &ctx).await;
        let now_ms = read.clock.now_ms();

        match outcome {
            PushOutcome::Success {
                echo, etag, created, ..
            } => {
                let fallback = if offline_first { None } else { Some(value) };
                self.commit_canonical(&key, echo, fallback).await;
                read.bookkeeper.record_success(&key, etag, now_ms);
                read.tombstones.lift(&key);
                UpsertResult::Synced {
                    key,
                    created: created || existed_before == Some(false),
                }
            }
            PushOutcome::NotModified => {
                read.bookkeeper.record_success(&key, None, now_ms);
                UpsertResult::Synced {
                    key,
                    created: false,
                }
            }
            PushOutcome::Conflict { server_tag } => {
                if policy.require_online {
                    self.restore_prior(&key, prior, offline_first).await;
                }
                UpsertResult::Failed {
                    key,
                    cause: conflict_cause(server_tag),
                }
            }
            PushOutcome::Failure { cause, retry_after } => {
                self.record_failure(&key, &cause, retry_after);
                if policy.require_online {
                    self.restore_prior(&key, prior, offline_first).await;
                    UpsertResult::Failed { key, cause }
                } else if offline_first {
                    UpsertResult::Local { key }
                } else {
                    UpsertResult::Failed { key, cause }
                }
            }
        }
    }

    // --- replace ---

    async fn run_replace(
        &self,
        key: StoreKey,
        value: Domain,
        policy: ReplacePolicy,
    ) -> ReplaceResult {
        let read = Arc::clone(self.read());
        let offline_first = matches!(policy.mode, WriteMode::OfflineFirst);

        if offline_first {
            self.write_local(&key, value.clone()).await;
        }

        let ctx = MutationContext {
            precondition: policy.precondition.clone(),
            ..MutationContext::default()
        };
        let body = self.encoder.value_to_net(&key, &value);
        let outcome = self.putser.put(&key, body, &ctx).await;
        let now_ms = read.clock.now_ms();

        match outcome {
            PushOutcome::Success { echo, etag, .. } => {
                let fallback = if offline_first { None } else { Some(value) };
                self.commit_canonical(&key, echo, fallback).await;
                read.bookkeeper.record_success(&key, etag, now_ms);
                ReplaceResult::Synced
            }
            PushOutcome::NotModified => {
                read.bookkeeper.record_success(&key, None, now_ms);
                ReplaceResult::Synced
            }
            PushOutcome::Conflict { server_tag } => ReplaceResult::Failed {
                cause: conflict_cause(server_tag),
            },
            PushOutcome::Failure { cause, retry_after } => {
                self.record_failure(&key, &cause, retry_after);
                if offline_first {
                    ReplaceResult::Enqueued
                } else {
                    ReplaceResult::Failed { cause }
                }
            }
        }
    }
}
