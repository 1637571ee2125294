//! Generic poll → queue → reconcile engine.
//!
//! A [`Controller`] owns one [`WorkQueue`], a [`Poller`] that periodically
//! discovers work through an [`ItemSource`], and a [`Reconciler`] worker pool
//! that hands each dequeued item to a [`Reconcile`] implementation under a
//! deadline. Failed reconciles are never retried directly; the item comes
//! back through discovery as long as its remote state still qualifies.

pub mod config;
pub mod controller;
pub mod event;
pub mod poller;
pub mod queue;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ControllerConfig, OrchestratorConfig, ScanWatcherConfig};
pub use controller::{Controller, ControllerHandle};
pub use event::ReconcileEvent;
pub use poller::{ItemSource, Poller};
pub use queue::WorkQueue;
pub use reconciler::{Reconcile, Reconciler};
