use std::collections::{HashSet, VecDeque};
use std::fmt;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::event::ReconcileEvent;

struct QueueState<T> {
    pending: VecDeque<T>,
    pending_keys: HashSet<String>,
    in_flight: HashSet<String>,
}

/// Deduplicating FIFO of reconcile work.
///
/// An item is rejected while another item with the same hash key is either
/// pending or in flight. Dequeuing moves the key from pending to in flight;
/// the consumer releases it with [`WorkQueue::done`] once the reconcile
/// attempt is over, after which a later poll may enqueue it again.
pub struct WorkQueue<T: ReconcileEvent> {
    state: Mutex<QueueState<T>>,
    ready: Notify,
}

impl<T: ReconcileEvent> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ReconcileEvent> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (pending, in_flight) = self
            .state
            .try_lock()
            .map(|state| (state.pending.len(), state.in_flight.len()))
            .unwrap_or_default();
        f.debug_struct("WorkQueue")
            .field("pending", &pending)
            .field("in_flight", &in_flight)
            .finish()
    }
}

impl<T: ReconcileEvent> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                pending_keys: HashSet::new(),
                in_flight: HashSet::new(),
            }),
            ready: Notify::new(),
        }
    }

    /// Adds `item` unless its key is already pending or in flight.
    /// Returns whether the item was accepted.
    pub async fn enqueue(&self, item: T) -> bool {
        let key = item.hash_key();
        {
            let mut state = self.state.lock().await;
            if state.pending_keys.contains(&key) || state.in_flight.contains(&key) {
                return false;
            }
            state.pending_keys.insert(key);
            state.pending.push_back(item);
        }
        self.ready.notify_one();
        true
    }

    /// Waits for the next item, or returns `None` once `shutdown` fires.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<T> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.pending.pop_front() {
                    let key = item.hash_key();
                    state.pending_keys.remove(&key);
                    state.in_flight.insert(key);
                    let more = !state.pending.is_empty();
                    drop(state);
                    // Pass the wakeup on so another idle consumer picks up the rest.
                    if more {
                        self.ready.notify_one();
                    }
                    return Some(item);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = self.ready.notified() => {}
            }
        }
    }

    /// Releases the in-flight claim taken by [`WorkQueue::dequeue`].
    pub async fn done(&self, item: &T) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&item.hash_key());
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}
