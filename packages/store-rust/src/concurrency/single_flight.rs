//! Per-key coalescing of concurrent fetches.
//!
//! The registry maps each key to a weakly held shared future. Callers that
//! arrive while a flight is up join it and observe the same outcome;
//! callers that arrive after completion (or after every waiter dropped)
//! start a fresh flight. The shared future is driven by its waiters, so
//! dropping the last waiter cancels the underlying work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use stratum_core::StoreKey;

/// Handle to a coalesced flight. Awaiting it yields the flight's outcome;
/// cloning it adds a waiter.
pub type SharedFlight<T> = Shared<BoxFuture<'static, T>>;

struct Flight<T: Clone> {
    id: u64,
    weak: WeakShared<BoxFuture<'static, T>>,
}

type Registry<T> = Mutex<HashMap<StoreKey, Flight<T>>>;

/// Coalesces concurrent work per key.
///
/// `T` must be `Clone` because every waiter receives its own copy of the
/// outcome.
pub struct SingleFlight<T: Clone> {
    registry: Arc<Registry<T>>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins the in-flight work for `key`, or starts `work` if none is up.
    ///
    /// `work` is only invoked when a new flight starts. The returned handle
    /// must be awaited (or polled) for the work to make progress; the
    /// flight is cancelled when its last waiter is dropped, and
    /// deregistered when it completes or is cancelled. A failure outcome is
    /// delivered to every waiter and does not block later flights.
    pub fn launch<F, Fut>(&self, key: &StoreKey, work: F) -> SharedFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut registry = self.registry.lock();

        if let Some(flight) = registry.get(key) {
            if let Some(shared) = flight.weak.upgrade() {
                tracing::debug!(key = %key, "joined in-flight work");
                return shared;
            }
            // Every waiter of the previous flight dropped before the
            // deregistration guard ran; fall through and replace it.
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            registry: Arc::downgrade(&self.registry),
            key: key.clone(),
            id,
        };
        let fut = work();
        let shared = async move {
            let _deregister = guard;
            fut.await
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            registry.insert(key.clone(), Flight { id, weak });
        }
        shared
    }

    /// Whether a flight is currently registered (and alive) for `key`.
    #[must_use]
    pub fn in_flight(&self, key: &StoreKey) -> bool {
        self.registry
            .lock()
            .get(key)
            .is_some_and(|flight| flight.weak.upgrade().is_some())
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters a flight when its future completes or is dropped.
///
/// The removal is gated on the flight id so a preempted cleanup can never
/// evict a newer flight registered under the same key.
struct FlightGuard<T: Clone> {
    registry: Weak<Registry<T>>,
    key: StoreKey,
    id: u64,
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock();
            if registry.get(&self.key).is_some_and(|f| f.id == self.id) {
                registry.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn key(id: &str) -> StoreKey {
        StoreKey::by_id("app", "user", id)
    }

    #[tokio::test]
    async fn concurrent_launches_run_work_once() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let calls = Arc::clone(&calls);
            let shared = flights.launch(&key("1"), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                7
            });
            handles.push(tokio::spawn(shared));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("join"), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_propagates_to_all_waiters_and_unblocks_retries() {
        let flights: Arc<SingleFlight<Result<u32, String>>> = Arc::new(SingleFlight::new());

        let first = flights.launch(&key("1"), || async { Err("boom".to_string()) });
        // Must join the first flight; if this work ran, the assertion on
        // the joined outcome below would see Ok(13).
        let joined = flights.launch(&key("1"), || async { Ok(13) });
        assert_eq!(first.await, Err("boom".to_string()));
        assert_eq!(joined.await, Err("boom".to_string()));

        // A failed flight is deregistered; the next launch runs fresh work.
        let retry = flights.launch(&key("1"), || async { Ok(42) });
        assert_eq!(retry.await, Ok(42));
    }

    #[tokio::test]
    async fn completed_flight_is_deregistered() {
        let flights: SingleFlight<u32> = SingleFlight::new();

        let first = flights.launch(&key("1"), || async { 1 });
        assert!(flights.in_flight(&key("1")));
        assert_eq!(first.await, 1);
        assert!(!flights.in_flight(&key("1")));

        let second = flights.launch(&key("1"), || async { 2 });
        assert_eq!(second.await, 2);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let c2 = Arc::clone(&calls);
        let a = flights.launch(&key("1"), move || async move {
            c1.fetch_add(1, Ordering::SeqCst);
            1
        });
        let b = flights.launch(&key("2"), move || async move {
            c2.fetch_add(1, Ordering::SeqCst);
            2
        });

        assert_eq!(a.await, 1);
        assert_eq!(b.await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_every_waiter_cancels_and_deregisters() {
        struct DropFlag(Arc<AtomicUsize>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let flights: SingleFlight<u32> = SingleFlight::new();
        let dropped = Arc::new(AtomicUsize::new(0));

        let flag = DropFlag(Arc::clone(&dropped));
        let shared = flights.launch(&key("1"), move || async move {
            let _keep = flag;
            std::future::pending::<()>().await;
            0
        });
        assert!(flights.in_flight(&key("1")));

        drop(shared);
        assert_eq!(dropped.load(Ordering::SeqCst), 1, "work was cancelled");
        assert!(!flights.in_flight(&key("1")));

        // The key is immediately reusable.
        let fresh = flights.launch(&key("1"), || async { 9 });
        assert_eq!(fresh.await, 9);
    }
}
