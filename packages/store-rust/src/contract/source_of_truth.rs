//! Durable, reactive per-key storage contract.
//!
//! The source of truth is owned by the caller; the store only requires
//! reactive per-key reads, serialized writes and deletes, a transactional
//! scope, and an atomic rekey. Two reference implementations ship in
//! [`crate::sot`].

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use stratum_core::{StoreError, StoreKey};

/// Closure executed inside [`SourceOfTruth::with_transaction`].
pub type TransactionBlock =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StoreError>> + Send>;

/// Merge function applied during [`SourceOfTruth::rekey`].
///
/// Receives the value stored under the old key and the value already under
/// the new key (if any), and produces the value to store under the new key.
pub type ReconcileFn<Rd, Wr> =
    Box<dyn FnOnce(Rd, Option<Rd>) -> Result<Wr, StoreError> + Send>;

/// Durable, reactive per-key store.
///
/// `Rd` is the projection produced by reads; `Wr` is the value accepted by
/// writes. Implementations must be reactive: a reader subscribed to a key
/// observes every subsequent `write`/`delete`/`rekey` affecting that key.
///
/// Used as `Arc<dyn SourceOfTruth<Rd, Wr>>`.
#[async_trait]
pub trait SourceOfTruth<Rd, Wr>: Send + Sync
where
    Rd: Send + 'static,
    Wr: Send + 'static,
{
    /// Opens a lazy, infinite stream of projections for `key`.
    ///
    /// The stream emits the current value (or `None`) immediately on
    /// subscription, then one item per subsequent change. Each subscriber
    /// gets an independent stream.
    fn reader(&self, key: &StoreKey) -> BoxStream<'static, Option<Rd>>;

    /// Durably writes `value` under `key`.
    ///
    /// Writing an identical value and metadata again is permitted and must
    /// not fail.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Persistence`] variant when the backing store
    /// rejects the write.
    async fn write(&self, key: &StoreKey, value: Wr) -> Result<(), StoreError>;

    /// Deletes the row under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Persistence`] variant when the backing store
    /// rejects the delete. Deleting an absent row is not an error.
    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError>;

    /// Runs `block` inside an exclusive transactional scope.
    ///
    /// The scope is released on every exit path: success, failure, and
    /// cancellation of the surrounding task.
    ///
    /// # Errors
    ///
    /// Propagates the block's error, or a persistence error from acquiring
    /// the transactional context.
    async fn with_transaction(&self, block: TransactionBlock) -> Result<(), StoreError>;

    /// Atomically moves the row under `old` to `new`.
    ///
    /// `reconcile` merges the old row with any value already stored under
    /// `new`. Subscribers of `new` observe at most one net change;
    /// subscribers of `old` observe a single terminal `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no row exists under `old`, or
    /// the reconcile function's error.
    async fn rekey(
        &self,
        old: &StoreKey,
        new: &StoreKey,
        reconcile: ReconcileFn<Rd, Wr>,
    ) -> Result<(), StoreError>;
}
