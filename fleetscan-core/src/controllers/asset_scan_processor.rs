use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{AssetScanFilter, ListParams, StateBackend};
use crate::error::{OrchestratorError, Result};
use crate::findings::FindingsConverter;
use crate::merge_patch;
use crate::models::{AssetScan, AssetScanId, Family};
use crate::orchestration::{
    Controller, ControllerConfig, ControllerHandle, ItemSource, Reconcile, ReconcileEvent,
};

pub const CONTROLLER_NAME: &str = "AssetScanProcessor";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetScanReconcileEvent {
    pub asset_scan_id: AssetScanId,
}

impl fmt::Display for AssetScanReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetScanID={}", self.asset_scan_id)
    }
}

impl ReconcileEvent for AssetScanReconcileEvent {
    fn hash_key(&self) -> String {
        self.asset_scan_id.to_string()
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("asset_scan", asset_scan_id = %self.asset_scan_id)
    }
}

/// Turns finished asset scans into findings, once.
///
/// Each family that finished without errors is handed to the
/// [`FindingsConverter`]; families still running or reporting errors are
/// skipped for good. Only after every eligible family converted is
/// `findingsProcessed` set, which removes the asset scan from discovery.
pub struct AssetScanProcessor {
    backend: Arc<dyn StateBackend>,
    converter: Arc<dyn FindingsConverter>,
    config: ControllerConfig,
}

impl fmt::Debug for AssetScanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetScanProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssetScanProcessor {
    pub fn new(
        backend: Arc<dyn StateBackend>,
        converter: Arc<dyn FindingsConverter>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            backend,
            converter,
            config,
        }
    }

    pub fn controller(self: &Arc<Self>) -> Controller<AssetScanReconcileEvent> {
        Controller::new(CONTROLLER_NAME, &self.config, self.clone(), self.clone())
    }

    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> ControllerHandle {
        self.controller().start(shutdown)
    }

    async fn convert_family(
        &self,
        asset_scan: &AssetScan,
        id: &AssetScanId,
        family: Family,
    ) -> Result<()> {
        let eligible = asset_scan
            .family_status(family)
            .is_some_and(|status| status.completed_without_errors());
        if !eligible {
            tracing::debug!(%family, "skipping family that did not complete cleanly");
            return Ok(());
        }

        self.converter
            .convert(asset_scan, family)
            .await
            .map_err(|source| OrchestratorError::FamilyConversion {
                asset_scan_id: id.clone(),
                family,
                source: Box::new(source),
            })
    }
}

#[async_trait]
impl ItemSource<AssetScanReconcileEvent> for AssetScanProcessor {
    async fn get_items(&self) -> Result<Vec<AssetScanReconcileEvent>> {
        let params = ListParams::filtered(AssetScanFilter::FindingsPending).select(&["id"]);
        let asset_scans = self
            .backend
            .list_asset_scans(&params)
            .await
            .map_err(|e| e.context("failed to get asset scans from API"))?;

        Ok(asset_scans
            .into_iter()
            .filter_map(|asset_scan| asset_scan.id)
            .map(|asset_scan_id| AssetScanReconcileEvent { asset_scan_id })
            .collect())
    }
}

#[async_trait]
impl Reconcile<AssetScanReconcileEvent> for AssetScanProcessor {
    async fn reconcile(&self, event: &AssetScanReconcileEvent) -> Result<()> {
        // The event may have waited in the queue; act on current state only.
        let asset_scan = self
            .backend
            .get_asset_scan(&event.asset_scan_id)
            .await
            .map_err(|e| e.context("failed to get asset scan from API"))?;

        if asset_scan.is_findings_processed() {
            tracing::debug!("findings already processed");
            return Ok(());
        }

        for family in Family::ALL {
            self.convert_family(&asset_scan, &event.asset_scan_id, family)
                .await?;
        }

        let patch = merge_patch::to_patch(&AssetScan {
            findings_processed: Some(true),
            ..AssetScan::default()
        })?;
        self.backend
            .patch_asset_scan(&event.asset_scan_id, &patch)
            .await
            .map_err(|e| {
                e.context(format!("failed to update asset scan {}", event.asset_scan_id))
            })?;

        tracing::info!("asset scan findings processed");
        Ok(())
    }
}
