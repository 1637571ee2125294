//! Reconciliation control plane for fleet-wide security scans.
//!
//! Scan state lives in a remote store reached through
//! [`backend::StateBackend`]. Three controllers built on the generic
//! [`orchestration`] engine poll that store and drive records forward:
//!
//! - [`controllers::ScanConfigWatcher`] starts scans when a schedule is due,
//! - [`controllers::ScanWatcher`] moves scans through their lifecycle,
//! - [`controllers::AssetScanProcessor`] converts finished asset scans into
//!   findings exactly once.
//!
//! Every write is a partial document applied with [`merge_patch`] semantics.
//! [`Orchestrator`] starts and stops all of them together.

pub mod backend;
pub mod controllers;
pub mod error;
pub mod findings;
pub mod merge_patch;
pub mod models;
pub mod orchestration;
pub mod orchestrator;

pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
