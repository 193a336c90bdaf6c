//! Closure-backed source of truth.
//!
//! Wraps user-supplied `read`/`write`/`delete` functions (file, key-value
//! store, SQL, anything) and layers per-key change notification on top so
//! readers stay reactive: every write or delete through this wrapper bumps
//! the key's version cell, and each reader re-reads on every bump.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream};
use stratum_core::{StoreError, StoreKey};
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::contract::{ReconcileFn, SourceOfTruth, TransactionBlock};

type ReadFn<Rd> =
    dyn Fn(StoreKey) -> BoxFuture<'static, Result<Option<Rd>, StoreError>> + Send + Sync;
type WriteFn<Wr> =
    dyn Fn(StoreKey, Wr) -> BoxFuture<'static, Result<(), StoreError>> + Send + Sync;
type DeleteFn = dyn Fn(StoreKey) -> BoxFuture<'static, Result<(), StoreError>> + Send + Sync;

/// Reactive wrapper over caller-supplied storage closures.
pub struct SimpleSourceOfTruth<Rd, Wr> {
    read: Arc<ReadFn<Rd>>,
    write: Arc<WriteFn<Wr>>,
    delete: Arc<DeleteFn>,
    versions: DashMap<StoreKey, watch::Sender<u64>>,
    txn: AsyncMutex<()>,
}

impl<Rd, Wr> SimpleSourceOfTruth<Rd, Wr>
where
    Rd: Send + 'static,
    Wr: Send + 'static,
{
    /// Builds a source of truth from three storage closures.
    pub fn new<R, RFut, W, WFut, D, DFut>(read: R, write: W, delete: D) -> Self
    where
        R: Fn(StoreKey) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<Option<Rd>, StoreError>> + Send + 'static,
        W: Fn(StoreKey, Wr) -> WFut + Send + Sync + 'static,
        WFut: Future<Output = Result<(), StoreError>> + Send + 'static,
        D: Fn(StoreKey) -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        Self {
            read: Arc::new(move |key| read(key).boxed()),
            write: Arc::new(move |key, value| write(key, value).boxed()),
            delete: Arc::new(move |key| delete(key).boxed()),
            versions: DashMap::new(),
            txn: AsyncMutex::new(()),
        }
    }

    fn version_cell(&self, key: &StoreKey) -> watch::Sender<u64> {
        self.versions
            .entry(key.clone())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }

    fn notify(&self, key: &StoreKey) {
        self.version_cell(key).send_modify(|version| *version += 1);
    }
}

#[async_trait]
impl<Rd, Wr> SourceOfTruth<Rd, Wr> for SimpleSourceOfTruth<Rd, Wr>
where
    Rd: Send + 'static,
    Wr: Send + 'static,
{
    fn reader(&self, key: &StoreKey) -> BoxStream<'static, Option<Rd>> {
        let read = Arc::clone(&self.read);
        let rx = self.version_cell(key).subscribe();
        let key = key.clone();

        Box::pin(stream::unfold(
            (rx, false),
            move |(mut rx, started)| {
                let read = Arc::clone(&read);
                let key = key.clone();
                async move {
                    if started && rx.changed().await.is_err() {
                        return None;
                    }
                    // Read errors degrade to an absent row rather than
                    // terminating the stream.
                    let row = read(key).await.unwrap_or(None);
                    Some((row, (rx, true)))
                }
            },
        ))
    }

    async fn write(&self, key: &StoreKey, value: Wr) -> Result<(), StoreError> {
        (self.write)(key.clone(), value).await?;
        self.notify(key);
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError> {
        (self.delete)(key.clone()).await?;
        self.notify(key);
        Ok(())
    }

    async fn with_transaction(&self, block: TransactionBlock) -> Result<(), StoreError> {
        let _guard = self.txn.lock().await;
        block().await
    }

    async fn rekey(
        &self,
        old: &StoreKey,
        new: &StoreKey,
        reconcile: ReconcileFn<Rd, Wr>,
    ) -> Result<(), StoreError> {
        let _guard = self.txn.lock().await;

        let Some(old_row) = (self.read)(old.clone()).await? else {
            return Err(StoreError::NotFound(old.clone()));
        };
        let existing = (self.read)(new.clone()).await.unwrap_or(None);
        let merged = reconcile(old_row, existing)?;

        (self.write)(new.clone(), merged).await?;
        (self.delete)(old.clone()).await?;
        self.notify(new);
        self.notify(old);
        tracing::debug!(old = %old, new = %new, "rekeyed row");
        Ok(())
    }
}
