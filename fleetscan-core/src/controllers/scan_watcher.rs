use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::backend::{AssetFilter, AssetScanFilter, ListParams, ScanFilter, StateBackend};
use crate::error::Result;
use crate::merge_patch;
use crate::models::{
    AssetScan, AssetScanState, AssetScanStatus, FamilyStatus, Reference, Scan, ScanId, ScanState,
    ScanStateReason, ScanSummary,
};
use crate::orchestration::{
    Controller, ControllerHandle, ItemSource, Reconcile, ReconcileEvent, ScanWatcherConfig,
};

pub const CONTROLLER_NAME: &str = "ScanWatcher";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanReconcileEvent {
    pub scan_id: ScanId,
}

impl fmt::Display for ScanReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanID={}", self.scan_id)
    }
}

impl ReconcileEvent for ScanReconcileEvent {
    fn hash_key(&self) -> String {
        self.scan_id.to_string()
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("scan", scan_id = %self.scan_id)
    }
}

/// Moves scans through their lifecycle.
///
/// `Pending` scans get one asset scan per asset in scope and become
/// `Discovered`, then `InProgress`. In-progress scans track their asset scans
/// until every one of them finished. Aborted and timed out scans abort their
/// unfinished asset scans and end as `Failed`.
pub struct ScanWatcher {
    backend: Arc<dyn StateBackend>,
    config: ScanWatcherConfig,
}

impl fmt::Debug for ScanWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanWatcher {
    pub fn new(backend: Arc<dyn StateBackend>, config: ScanWatcherConfig) -> Self {
        Self { backend, config }
    }

    pub fn controller(self: &Arc<Self>) -> Controller<ScanReconcileEvent> {
        Controller::new(
            CONTROLLER_NAME,
            &self.config.controller,
            self.clone(),
            self.clone(),
        )
    }

    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> ControllerHandle {
        self.controller().start(shutdown)
    }

    /// Point in time after which a running scan is failed as timed out.
    fn deadline(&self, scan: &Scan) -> Option<DateTime<Utc>> {
        let start_time = scan.start_time?;
        let secs = scan.timeout_seconds.unwrap_or(self.config.scan_timeout_secs);
        let timeout = TimeDelta::try_seconds(i64::try_from(secs).ok()?)?;
        start_time.checked_add_signed(timeout)
    }

    async fn patch_scan(&self, id: &ScanId, patch: Scan) -> Result<()> {
        let patch = merge_patch::to_patch(&patch)?;
        self.backend
            .patch_scan(id, &patch)
            .await
            .map_err(|e| e.context(format!("failed to patch scan {id}")))
    }

    async fn asset_scans(&self, id: &ScanId) -> Result<Vec<AssetScan>> {
        self.backend
            .list_asset_scans(&ListParams::filtered(AssetScanFilter::ForScan(id.clone())))
            .await
            .map_err(|e| e.context("failed to get asset scans from API"))
    }

    /// Marks every unfinished asset scan of the scan as aborted.
    async fn abort_asset_scans(&self, id: &ScanId) -> Result<usize> {
        let mut aborted = 0;
        for asset_scan in self.asset_scans(id).await? {
            if asset_scan.is_finished() {
                continue;
            }
            let Some(asset_scan_id) = asset_scan.id else {
                continue;
            };
            let patch = merge_patch::to_patch(&AssetScan {
                status: Some(AssetScanStatus {
                    general: Some(FamilyStatus::new(AssetScanState::Aborted)),
                    ..AssetScanStatus::default()
                }),
                ..AssetScan::default()
            })?;
            self.backend
                .patch_asset_scan(&asset_scan_id, &patch)
                .await
                .map_err(|e| e.context(format!("failed to abort asset scan {asset_scan_id}")))?;
            aborted += 1;
        }
        Ok(aborted)
    }

    async fn fail(
        &self,
        id: &ScanId,
        reason: ScanStateReason,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let aborted = self.abort_asset_scans(id).await?;
        let summary = ScanSummary::from_asset_scans(&self.asset_scans(id).await?);
        self.patch_scan(
            id,
            Scan {
                state: Some(ScanState::Failed),
                state_reason: Some(reason),
                state_message: Some(message.to_string()),
                end_time: Some(now),
                summary: Some(summary),
                ..Scan::default()
            },
        )
        .await?;
        tracing::info!(?reason, aborted, "scan failed");
        Ok(())
    }

    async fn reconcile_pending(&self, id: &ScanId, scan: &Scan, now: DateTime<Utc>) -> Result<()> {
        let assets = self
            .backend
            .list_assets(&ListParams::filtered(AssetFilter::in_scope(
                scan.scope.as_deref(),
            )))
            .await
            .map_err(|e| e.context("failed to discover assets for scan"))?;

        if assets.is_empty() {
            tracing::info!("no assets in scope");
            return self
                .patch_scan(
                    id,
                    Scan {
                        state: Some(ScanState::Done),
                        state_reason: Some(ScanStateReason::NothingToScan),
                        state_message: Some("Nothing to scan".to_string()),
                        end_time: Some(now),
                        summary: Some(ScanSummary::default()),
                        ..Scan::default()
                    },
                )
                .await;
        }

        let mut jobs = 0u32;
        for asset in &assets {
            let Some(asset_id) = asset.id.clone() else {
                continue;
            };
            let asset_scan = AssetScan {
                scan: Some(Reference::new(id.clone())),
                asset: Some(Reference::new(asset_id.clone())),
                status: Some(AssetScanStatus {
                    general: Some(FamilyStatus::new(AssetScanState::Pending)),
                    ..AssetScanStatus::default()
                }),
                findings_processed: Some(false),
                ..AssetScan::default()
            };
            match self.backend.create_asset_scan(&asset_scan).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => {
                    tracing::debug!(%asset_id, "asset scan already exists");
                }
                Err(err) => {
                    return Err(
                        err.context(format!("failed to create asset scan for asset {asset_id}"))
                    );
                }
            }
            jobs += 1;
        }

        self.patch_scan(
            id,
            Scan {
                state: Some(ScanState::Discovered),
                state_message: Some("Assets for scan are discovered".to_string()),
                start_time: Some(scan.start_time.unwrap_or(now)),
                summary: Some(ScanSummary {
                    jobs_left_to_run: jobs,
                    ..ScanSummary::default()
                }),
                ..Scan::default()
            },
        )
        .await?;
        tracing::info!(assets = jobs, "scan discovered");
        Ok(())
    }

    async fn reconcile_in_progress(
        &self,
        id: &ScanId,
        scan: &Scan,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let summary = ScanSummary::from_asset_scans(&self.asset_scans(id).await?);

        if !summary.all_finished() {
            if scan.summary.as_ref() != Some(&summary) {
                self.patch_scan(
                    id,
                    Scan {
                        summary: Some(summary),
                        ..Scan::default()
                    },
                )
                .await?;
            }
            return Ok(());
        }

        let (state, reason, message) = if summary.jobs_failed > 0 {
            (
                ScanState::Failed,
                ScanStateReason::OneOrMoreAssetFailedToScan,
                format!("{} asset scan(s) failed", summary.jobs_failed),
            )
        } else {
            (
                ScanState::Done,
                ScanStateReason::Success,
                "All asset scans completed".to_string(),
            )
        };
        self.patch_scan(
            id,
            Scan {
                state: Some(state),
                state_reason: Some(reason),
                state_message: Some(message),
                end_time: Some(now),
                summary: Some(summary),
                ..Scan::default()
            },
        )
        .await?;
        tracing::info!(state = state.as_str(), "scan finished");
        Ok(())
    }
}

#[async_trait]
impl ItemSource<ScanReconcileEvent> for ScanWatcher {
    async fn get_items(&self) -> Result<Vec<ScanReconcileEvent>> {
        let params = ListParams::filtered(ScanFilter::Unfinished).select(&["id"]);
        let scans = self
            .backend
            .list_scans(&params)
            .await
            .map_err(|e| e.context("failed to get scans from API"))?;

        Ok(scans
            .into_iter()
            .filter_map(|scan| scan.id)
            .map(|scan_id| ScanReconcileEvent { scan_id })
            .collect())
    }
}

#[async_trait]
impl Reconcile<ScanReconcileEvent> for ScanWatcher {
    async fn reconcile(&self, event: &ScanReconcileEvent) -> Result<()> {
        let id = &event.scan_id;
        let scan = self
            .backend
            .get_scan(id)
            .await
            .map_err(|e| e.context("failed to get scan from API"))?;

        if scan.is_ended() {
            tracing::debug!("scan already ended");
            return Ok(());
        }

        let now = Utc::now();
        if self.deadline(&scan).is_some_and(|deadline| now > deadline) {
            return self
                .fail(id, ScanStateReason::TimedOut, "Scan has timed out", now)
                .await;
        }

        match scan.state.unwrap_or(ScanState::Pending) {
            ScanState::Pending => self.reconcile_pending(id, &scan, now).await,
            ScanState::Discovered => {
                self.patch_scan(
                    id,
                    Scan {
                        state: Some(ScanState::InProgress),
                        state_message: Some("Scan is in progress".to_string()),
                        ..Scan::default()
                    },
                )
                .await
            }
            ScanState::InProgress => self.reconcile_in_progress(id, &scan, now).await,
            ScanState::Aborted => {
                self.fail(id, ScanStateReason::Aborted, "Scan has been aborted", now)
                    .await
            }
            ScanState::Failed | ScanState::Done => Ok(()),
        }
    }
}
