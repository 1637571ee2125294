//! Conversion of raw family results into persisted findings.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::StateBackend;
use crate::error::{OrchestratorError, Result};
use crate::models::{AssetScan, Family, Finding};

/// Turns one family's results on an asset scan into findings.
///
/// Conversion may be repeated for the same asset scan and family after a
/// failed reconcile, so implementations must not create duplicates.
#[async_trait]
pub trait FindingsConverter: Send + Sync {
    async fn convert(&self, asset_scan: &AssetScan, family: Family) -> Result<()>;
}

/// Creates one finding per item of `results.<family>.items`.
///
/// Finding ids are derived from the asset scan, the family and the item, so
/// a repeated conversion hits `Conflict` for every finding it already
/// created and skips it.
pub struct ResultFindingsConverter {
    backend: Arc<dyn StateBackend>,
}

impl fmt::Debug for ResultFindingsConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFindingsConverter").finish_non_exhaustive()
    }
}

impl ResultFindingsConverter {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FindingsConverter for ResultFindingsConverter {
    async fn convert(&self, asset_scan: &AssetScan, family: Family) -> Result<()> {
        let asset_scan_id = asset_scan.id.as_ref().ok_or_else(|| {
            OrchestratorError::Internal("asset scan without an id".to_string())
        })?;
        let asset_id = asset_scan.asset.as_ref().map(|asset| &asset.id);

        let mut created = 0usize;
        let mut existing = 0usize;
        for item in asset_scan.family_items(family) {
            let finding = Finding::from_item(asset_scan_id, asset_id, family, item);
            match self.backend.create_finding(&finding).await {
                Ok(_) => created += 1,
                Err(err) if err.is_conflict() => existing += 1,
                Err(err) => {
                    return Err(err.context(format!("failed to create finding {}", finding.id)));
                }
            }
        }

        tracing::debug!(
            asset_scan_id = %asset_scan_id,
            %family,
            created,
            existing,
            "converted family results to findings"
        );
        Ok(())
    }
}
