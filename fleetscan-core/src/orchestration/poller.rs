use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::ReconcileEvent;
use super::queue::WorkQueue;
use crate::error::Result;

/// Discovery query feeding a poller.
#[async_trait]
pub trait ItemSource<T>: Send + Sync {
    async fn get_items(&self) -> Result<Vec<T>>;
}

/// Periodically asks an [`ItemSource`] for work and enqueues the results.
///
/// Discovery failures are logged and retried on the next tick; they never
/// stop the loop.
pub struct Poller<T: ReconcileEvent> {
    controller: &'static str,
    period: Duration,
    source: Arc<dyn ItemSource<T>>,
    queue: Arc<WorkQueue<T>>,
}

impl<T: ReconcileEvent> Clone for Poller<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller,
            period: self.period,
            source: Arc::clone(&self.source),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: ReconcileEvent> fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("controller", &self.controller)
            .field("period", &self.period)
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T: ReconcileEvent> Poller<T> {
    pub fn new(
        controller: &'static str,
        period: Duration,
        source: Arc<dyn ItemSource<T>>,
        queue: Arc<WorkQueue<T>>,
    ) -> Self {
        Self {
            controller,
            period: period.max(Duration::from_millis(1)),
            source,
            queue,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs one discovery round. Returns how many items were newly queued.
    pub async fn poll_once(&self) -> Result<usize> {
        let items = self.source.get_items().await?;
        let discovered = items.len();
        let mut accepted = 0;
        for item in items {
            if self.queue.enqueue(item).await {
                accepted += 1;
            }
        }
        debug!(
            controller = self.controller,
            discovered, accepted, "poll completed"
        );
        Ok(accepted)
    }

    /// Spawns the poll loop. The first poll happens immediately.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => {
                    if let Err(err) = result {
                        warn!(
                            controller = self.controller,
                            error = %err,
                            "failed to get items to reconcile"
                        );
                    }
                }
            }
        }

        info!(controller = self.controller, "poller shutting down");
    }
}
