use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::event::ReconcileEvent;
use super::queue::WorkQueue;
use crate::error::{OrchestratorError, Result};

/// Drives one work item toward its desired state.
///
/// Implementations must re-fetch authoritative state before acting; the item
/// may have waited in the queue for a while.
#[async_trait]
pub trait Reconcile<T>: Send + Sync {
    async fn reconcile(&self, event: &T) -> Result<()>;
}

/// Pool of workers draining a [`WorkQueue`] into a [`Reconcile`] handler.
///
/// Each attempt is bounded by `timeout`, and a panicking handler counts as a
/// failed attempt. Failed items are not re-enqueued;
/// the next discovery poll picks them up again if they still qualify.
pub struct Reconciler<T: ReconcileEvent> {
    controller: &'static str,
    timeout: Duration,
    workers: usize,
    handler: Arc<dyn Reconcile<T>>,
    queue: Arc<WorkQueue<T>>,
}

impl<T: ReconcileEvent> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller,
            timeout: self.timeout,
            workers: self.workers,
            handler: Arc::clone(&self.handler),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: ReconcileEvent> fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("controller", &self.controller)
            .field("timeout", &self.timeout)
            .field("workers", &self.workers)
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T: ReconcileEvent> Reconciler<T> {
    pub fn new(
        controller: &'static str,
        timeout: Duration,
        workers: usize,
        handler: Arc<dyn Reconcile<T>>,
        queue: Arc<WorkQueue<T>>,
    ) -> Self {
        Self {
            controller,
            timeout,
            workers: workers.max(1),
            handler,
            queue,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the worker pool.
    pub fn start(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.workers)
            .map(|worker| {
                let reconciler = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { reconciler.run(worker, shutdown).await })
            })
            .collect()
    }

    async fn run(self, worker: usize, shutdown: CancellationToken) {
        while let Some(item) = self.queue.dequeue(&shutdown).await {
            let span = item.span();
            // Outcome is logged inside; failures wait for rediscovery.
            let _ = self
                .reconcile_one(&item, &shutdown)
                .instrument(span)
                .await;
            self.queue.done(&item).await;
        }
        tracing::info!(
            controller = self.controller,
            worker,
            "reconcile worker shutting down"
        );
    }

    /// Runs one bounded reconcile attempt and logs its outcome.
    pub async fn reconcile_one(&self, item: &T, shutdown: &CancellationToken) -> Result<()> {
        let attempt = AssertUnwindSafe(self.handler.reconcile(item)).catch_unwind();
        let attempt = tokio::time::timeout(self.timeout, attempt);
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => Err(OrchestratorError::Cancelled(item.to_string())),
            result = attempt => match result {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => Err(OrchestratorError::Panicked {
                    item: item.to_string(),
                    message: panic_message(payload.as_ref()),
                }),
                Err(_) => Err(OrchestratorError::Timeout {
                    item: item.to_string(),
                    timeout: self.timeout,
                }),
            },
        };

        match &outcome {
            Ok(()) => tracing::debug!(controller = self.controller, "reconciled {item}"),
            Err(OrchestratorError::Cancelled(_)) => {
                tracing::info!(controller = self.controller, "reconcile of {item} cancelled by shutdown")
            }
            Err(err) => tracing::error!(
                controller = self.controller,
                error = %err,
                "failed to reconcile {item}"
            ),
        }
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
