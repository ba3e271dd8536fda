//! In-flight request deduplication.

use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

/// A settled-once result every joined caller receives a clone of.
pub type SharedResult = Shared<BoxFuture<'static, Result<Value>>>;

struct Slot {
    id: u64,
    future: SharedResult,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the slot when the computation finishes, panics included.
struct RemoveOnDrop {
    slots: Slots,
    key: String,
    id: u64,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if slots.get(&self.key).map(|s| s.id) == Some(self.id) {
            slots.remove(&self.key);
        }
    }
}

/// Tracks backend calls that have started but not settled.
///
/// At most one call per key runs at a time; callers arriving while it runs
/// attach to it instead of starting their own. The call is spawned on the
/// Tokio runtime, so it runs to completion even if every caller goes away.
#[derive(Default)]
pub struct InFlightTracker {
    slots: Slots,
    next_id: AtomicU64,
    joins: AtomicU64,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the call running for `key`, or starts `factory()` as that call.
    ///
    /// The slot is registered before this returns and removed once the call
    /// settles, whether it succeeded or failed.
    pub fn dedupe<F, Fut>(&self, key: &str, factory: F) -> SharedResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(key) {
            self.joins.fetch_add(1, Ordering::Relaxed);
            debug!(key, "joined in-flight request");
            return slot.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let guard = RemoveOnDrop {
            slots: Arc::clone(&self.slots),
            key: key.to_string(),
            id,
        };
        let computation = factory();
        // The slot map is still locked here, so the guard cannot remove the
        // slot before it is inserted below.
        tokio::spawn(async move {
            let result = computation.await;
            // Evict first: later callers either join a channel that will
            // receive this result or start a fresh call.
            drop(guard);
            let _ = tx.send(result);
        });

        let dropped_key = key.to_string();
        let future = rx
            .map(move |received| {
                received.unwrap_or_else(|_| Err(Error::InFlightDropped { key: dropped_key }))
            })
            .boxed()
            .shared();
        slots.insert(
            key.to_string(),
            Slot {
                id,
                future: future.clone(),
            },
        );
        future
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of callers that attached to an existing call.
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }

    /// Forgets all running calls. They still complete, and callers already
    /// attached still receive their results, but new callers start fresh.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_computation() {
        let tracker = InFlightTracker::new();
        let calls = Arc::new(AtomicU32::new(0));

        let make = |calls: Arc<AtomicU32>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, Error>(json!("done"))
            }
        };
        let a = tracker.dedupe("k", make(Arc::clone(&calls)));
        let b = tracker.dedupe("k", make(Arc::clone(&calls)));
        assert!(tracker.is_in_flight("k"));

        let (ra, rb) = futures::join!(a, b);
        assert_eq!(ra.unwrap(), json!("done"));
        assert_eq!(rb.unwrap(), json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.joins(), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_and_slot_cleared() {
        let tracker = InFlightTracker::new();
        let a = tracker.dedupe("k", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(Error::backend("network down"))
        });
        let b = tracker.dedupe("k", || async { Ok(json!("never")) });

        let (ra, rb) = futures::join!(a, b);
        assert_eq!(ra.unwrap_err().message(), "network down");
        assert_eq!(rb.unwrap_err().message(), "network down");
        assert!(!tracker.is_in_flight("k"));

        let c = tracker.dedupe("k", || async { Ok(json!("fresh")) });
        assert_eq!(c.await.unwrap(), json!("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_share() {
        let tracker = InFlightTracker::new();
        let a = tracker.dedupe("a", || async { Ok(json!(1)) });
        let b = tracker.dedupe("b", || async { Ok(json!(2)) });
        assert_eq!(tracker.len(), 2);
        assert_eq!(a.await.unwrap(), json!(1));
        assert_eq!(b.await.unwrap(), json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_completes_without_waiters() {
        let tracker = InFlightTracker::new();
        let done = Arc::new(AtomicU32::new(0));
        let flag = Arc::clone(&done);
        drop(tracker.dedupe("k", move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_does_not_evict_newer_slot() {
        let tracker = InFlightTracker::new();
        let old = tracker.dedupe("k", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!("old"))
        });
        tracker.clear();
        let new = tracker.dedupe("k", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!("new"))
        });
        assert_eq!(old.await.unwrap(), json!("old"));
        assert!(tracker.is_in_flight("k"));
        assert_eq!(new.await.unwrap(), json!("new"));
    }

    fn explode() -> Error {
        panic!("backend task panicked")
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_call_drops_slot_and_fails_joiners() {
        let tracker = InFlightTracker::new();
        let a = tracker.dedupe("boom", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Value, _>(explode())
        });
        let b = tracker.dedupe("boom", || async { Ok(json!("never")) });
        assert_eq!(tracker.joins(), 1);

        let (ra, rb) = futures::join!(a, b);
        for result in [ra, rb] {
            match result {
                Err(Error::InFlightDropped { key }) => assert_eq!(key, "boom"),
                other => panic!("expected InFlightDropped, got {:?}", other),
            }
        }
        assert!(tracker.is_empty());

        let c = tracker.dedupe("boom", || async { Ok(json!("recovered")) });
        assert_eq!(c.await.unwrap(), json!("recovered"));
    }
}
