use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ControllerConfig;
use super::event::ReconcileEvent;
use super::poller::{ItemSource, Poller};
use super::queue::WorkQueue;
use super::reconciler::{Reconcile, Reconciler};

/// One poller and one reconciler sharing a private work queue.
pub struct Controller<T: ReconcileEvent> {
    name: &'static str,
    poller: Poller<T>,
    reconciler: Reconciler<T>,
}

impl<T: ReconcileEvent> fmt::Debug for Controller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("poller", &self.poller)
            .field("reconciler", &self.reconciler)
            .finish()
    }
}

impl<T: ReconcileEvent> Controller<T> {
    pub fn new(
        name: &'static str,
        config: &ControllerConfig,
        source: Arc<dyn ItemSource<T>>,
        handler: Arc<dyn Reconcile<T>>,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new());
        let poller = Poller::new(name, config.poll_period(), source, Arc::clone(&queue));
        let reconciler = Reconciler::new(
            name,
            config.reconcile_timeout(),
            config.workers,
            handler,
            queue,
        );
        Self {
            name,
            poller,
            reconciler,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Launches the poll loop and the reconcile workers. Non-blocking.
    pub fn start(&self, shutdown: CancellationToken) -> ControllerHandle {
        let mut handles = self.reconciler.start(shutdown.clone());
        handles.push(self.poller.start(shutdown));
        tracing::info!(
            controller = self.name,
            workers = self.reconciler.workers(),
            period = ?self.poller.period(),
            "controller started"
        );
        ControllerHandle {
            name: self.name,
            handles,
        }
    }
}

/// Background tasks of a started controller.
#[derive(Debug)]
pub struct ControllerHandle {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for every task, giving each at most `grace` after cancellation.
    pub async fn join(self, grace: Duration) {
        for handle in self.handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(controller = self.name, "task failed: {:?}", e),
                Err(_) => {
                    tracing::warn!(controller = self.name, "task timed out during shutdown")
                }
            }
        }
    }
}
