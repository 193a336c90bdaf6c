//! In-memory source of truth backed by per-key watch channels.
//!
//! Each key owns a `tokio::sync::watch` cell holding `Option<V>`. Readers
//! subscribe to the cell, which delivers the current value immediately and
//! every subsequent change with replay-of-one semantics (rapid successive
//! writes may coalesce, which the store contract permits).

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use stratum_core::{StoreError, StoreKey};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_stream::wrappers::WatchStream;

use crate::contract::{ReconcileFn, SourceOfTruth, TransactionBlock};

/// Reactive in-memory store where reads and writes share one value type.
#[derive(Default)]
pub struct InMemorySourceOfTruth<V> {
    cells: DashMap<StoreKey, watch::Sender<Option<V>>>,
    txn: AsyncMutex<()>,
}

impl<V> InMemorySourceOfTruth<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            txn: AsyncMutex::new(()),
        }
    }

    /// Returns the current row under `key` without subscribing.
    #[must_use]
    pub fn snapshot(&self, key: &StoreKey) -> Option<V> {
        self.cells
            .get(key)
            .and_then(|cell| cell.borrow().clone())
    }

    /// Number of keys currently holding a value.
    pub fn len(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.borrow().is_some())
            .count()
    }

    /// Whether no key holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, key: &StoreKey) -> watch::Sender<Option<V>> {
        self.cells
            .entry(key.clone())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }
}

#[async_trait]
impl<V> SourceOfTruth<V, V> for InMemorySourceOfTruth<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn reader(&self, key: &StoreKey) -> BoxStream<'static, Option<V>> {
        Box::pin(WatchStream::new(self.cell(key).subscribe()))
    }

    async fn write(&self, key: &StoreKey, value: V) -> Result<(), StoreError> {
        self.cell(key).send_replace(Some(value));
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError> {
        if let Some(cell) = self.cells.get(key) {
            cell.send_replace(None);
        }
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
        reconcile: ReconcileFn<V, V>,
    ) -> Result<(), StoreError> {
        let _guard = self.txn.lock().await;

        let old_cell = self.cell(old);
        let Some(old_value) = old_cell.borrow().clone() else {
            return Err(StoreError::NotFound(old.clone()));
        };

        let new_cell = self.cell(new);
        let existing = new_cell.borrow().clone();
        let merged = reconcile(old_value, existing)?;

        // One net change per side: the merged row lands under the new key,
        // then the old key goes terminal.
        new_cell.send_replace(Some(merged));
        old_cell.send_replace(None);
        tracing::debug!(old = %old, new = %new, "rekeyed row");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn key(id: &str) -> StoreKey {
        StoreKey::by_id("app", "user", id)
    }

    #[tokio::test]
    async fn reader_emits_current_value_then_updates() {
        let sot = InMemorySourceOfTruth::<String>::new();
        sot.write(&key("1"), "first".into()).await.expect("write");

        let mut reader = sot.reader(&key("1"));
        assert_eq!(reader.next().await, Some(Some("first".into())));

        sot.write(&key("1"), "second".into()).await.expect("write");
        assert_eq!(reader.next().await, Some(Some("second".into())));
    }

    #[tokio::test]
    async fn reader_on_absent_key_emits_none_first() {
        let sot = InMemorySourceOfTruth::<String>::new();
        let mut reader = sot.reader(&key("1"));
        assert_eq!(reader.next().await, Some(None));

        sot.write(&key("1"), "late".into()).await.expect("write");
        assert_eq!(reader.next().await, Some(Some("late".into())));
    }

    #[tokio::test]
    async fn delete_emits_none_to_subscribers() {
        let sot = InMemorySourceOfTruth::<u32>::new();
        sot.write(&key("1"), 1).await.expect("write");

        let mut reader = sot.reader(&key("1"));
        assert_eq!(reader.next().await, Some(Some(1)));

        sot.delete(&key("1")).await.expect("delete");
        assert_eq!(reader.next().await, Some(None));
        assert!(sot.is_empty());
    }

    #[tokio::test]
    async fn each_subscriber_gets_an_independent_stream() {
        let sot = InMemorySourceOfTruth::<u32>::new();
        sot.write(&key("1"), 7).await.expect("write");

        let mut a = sot.reader(&key("1"));
        let mut b = sot.reader(&key("1"));
        assert_eq!(a.next().await, Some(Some(7)));
        assert_eq!(b.next().await, Some(Some(7)));
    }

    #[tokio::test]
    async fn with_transaction_runs_block_and_releases() {
        let sot = InMemorySourceOfTruth::<u32>::new();

        sot.with_transaction(Box::new(|| Box::pin(async { Ok(()) })))
            .await
            .expect("transaction");

        // A failing block releases the scope too; a second transaction
        // would deadlock otherwise.
        let failed = sot
            .with_transaction(Box::new(|| {
                Box::pin(async { Err(StoreError::Unknown("inner".into())) })
            }))
            .await;
        assert!(failed.is_err());

        sot.with_transaction(Box::new(|| Box::pin(async { Ok(()) })))
            .await
            .expect("scope was released");
    }

    #[tokio::test]
    async fn rekey_moves_row_and_merges() {
        let sot = InMemorySourceOfTruth::<String>::new();
        sot.write(&key("prov"), "draft".into()).await.expect("write");
        sot.write(&key("srv-1"), "server".into()).await.expect("write");

        let mut new_reader = sot.reader(&key("srv-1"));
        assert_eq!(new_reader.next().await, Some(Some("server".into())));
        let mut old_reader = sot.reader(&key("prov"));
        assert_eq!(old_reader.next().await, Some(Some("draft".into())));

        sot.rekey(
            &key("prov"),
            &key("srv-1"),
            Box::new(|old, existing| Ok(format!("{old}+{}", existing.unwrap_or_default()))),
        )
        .await
        .expect("rekey");

        // Exactly one merged value lands under the new key; the old key
        // goes terminal.
        assert_eq!(new_reader.next().await, Some(Some("draft+server".into())));
        assert_eq!(old_reader.next().await, Some(None));
        assert_eq!(sot.snapshot(&key("prov")), None);
    }

    #[tokio::test]
    async fn rekey_of_absent_row_is_not_found() {
        let sot = InMemorySourceOfTruth::<String>::new();
        let result = sot
            .rekey(&key("ghost"), &key("new"), Box::new(|old, _| Ok(old)))
            .await;
        assert_eq!(result, Err(StoreError::NotFound(key("ghost"))));
    }
}
