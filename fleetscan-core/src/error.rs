use std::time::Duration;

use thiserror::Error;

use crate::merge_patch::MergePatchError;
use crate::models::{AssetScanId, Family};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    MergePatch(#[from] MergePatchError),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The record already exists. `existing` carries the stored record when
    /// the backend reported it.
    #[error("{kind} already exists: {id}")]
    Conflict {
        kind: &'static str,
        id: String,
        existing: Option<serde_json::Value>,
    },

    #[error("failed to reconcile asset scan {asset_scan_id} {family} to findings: {source}")]
    FamilyConversion {
        asset_scan_id: AssetScanId,
        family: Family,
        source: Box<OrchestratorError>,
    },

    #[error("reconcile of {item} timed out after {timeout:?}")]
    Timeout { item: String, timeout: Duration },

    #[error("reconcile of {item} panicked: {message}")]
    Panicked { item: String, message: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<OrchestratorError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Wraps the error with a description of the stage that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        OrchestratorError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        OrchestratorError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True when the error, or any error it wraps, is a `Conflict`.
    pub fn is_conflict(&self) -> bool {
        match self {
            OrchestratorError::Conflict { .. } => true,
            OrchestratorError::Context { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            OrchestratorError::NotFound { .. } => true,
            OrchestratorError::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
