use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backend::{ListParams, ScanConfigFilter, ScanFilter, StateBackend};
use crate::error::Result;
use crate::models::{Reference, Scan, ScanConfig, ScanConfigId, ScanState};
use crate::orchestration::{
    Controller, ControllerConfig, ControllerHandle, ItemSource, Reconcile, ReconcileEvent,
};

pub const CONTROLLER_NAME: &str = "ScanConfigWatcher";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfigReconcileEvent {
    pub scan_config_id: ScanConfigId,
}

impl fmt::Display for ScanConfigReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanConfigID={}", self.scan_config_id)
    }
}

impl ReconcileEvent for ScanConfigReconcileEvent {
    fn hash_key(&self) -> String {
        self.scan_config_id.to_string()
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("scan_config", scan_config_id = %self.scan_config_id)
    }
}

/// True when a scan of `scan_config_id` is still running, or one started
/// after `operation_time` and therefore already covers this occurrence.
pub fn has_running_or_completed_scan(
    scans: &[Scan],
    scan_config_id: &ScanConfigId,
    operation_time: DateTime<Utc>,
) -> bool {
    scans
        .iter()
        .filter(|scan| {
            scan.scan_config
                .as_ref()
                .is_some_and(|config| &config.id == scan_config_id)
        })
        .any(|scan| {
            scan.end_time.is_none()
                || scan
                    .start_time
                    .is_some_and(|start_time| start_time > operation_time)
        })
}

/// Starts scans for scan configs whose scheduled operation time has come.
pub struct ScanConfigWatcher {
    backend: Arc<dyn StateBackend>,
    config: ControllerConfig,
}

impl fmt::Debug for ScanConfigWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfigWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanConfigWatcher {
    pub fn new(backend: Arc<dyn StateBackend>, config: ControllerConfig) -> Self {
        Self { backend, config }
    }

    pub fn controller(self: &Arc<Self>) -> Controller<ScanConfigReconcileEvent> {
        Controller::new(CONTROLLER_NAME, &self.config, self.clone(), self.clone())
    }

    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> ControllerHandle {
        self.controller().start(shutdown)
    }

    async fn create_scan(
        &self,
        id: &ScanConfigId,
        scan_config: &ScanConfig,
        operation_time: DateTime<Utc>,
    ) -> Result<()> {
        let template = scan_config.scan_template.clone().unwrap_or_default();
        let name = scan_config.name.as_deref().unwrap_or(id.as_str());
        let scan = Scan {
            name: Some(format!("{}-{}", name, operation_time.format("%Y%m%d%H%M%S"))),
            scan_config: Some(Reference::new(id.clone())),
            scope: template.scope,
            timeout_seconds: template.timeout_seconds,
            state: Some(ScanState::Pending),
            state_message: Some("Scan was created from scan config".to_string()),
            ..Scan::default()
        };

        match self.backend.create_scan(&scan).await {
            Ok(created) => {
                tracing::info!(scan_id = ?created.id, "scan created");
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                tracing::debug!("scan for this occurrence already exists");
                Ok(())
            }
            Err(err) => Err(err.context("failed to create scan")),
        }
    }

    /// Stores the next operation time, or drops it for one-shot configs.
    async fn advance_schedule(
        &self,
        id: &ScanConfigId,
        next: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let patch = json!({"scheduled": {"operationTime": next}});
        self.backend
            .patch_scan_config(id, &patch)
            .await
            .map_err(|e| e.context(format!("failed to patch scan config {id}")))?;

        match next {
            Some(next) => tracing::debug!(%next, "scan config rescheduled"),
            None => tracing::debug!("one-shot scan config unscheduled"),
        }
        Ok(())
    }
}

#[async_trait]
impl ItemSource<ScanConfigReconcileEvent> for ScanConfigWatcher {
    async fn get_items(&self) -> Result<Vec<ScanConfigReconcileEvent>> {
        let params = ListParams::filtered(ScanConfigFilter::DueBy(Utc::now())).select(&["id"]);
        let scan_configs = self
            .backend
            .list_scan_configs(&params)
            .await
            .map_err(|e| e.context("failed to get scan configs from API"))?;

        Ok(scan_configs
            .into_iter()
            .filter_map(|scan_config| scan_config.id)
            .map(|scan_config_id| ScanConfigReconcileEvent { scan_config_id })
            .collect())
    }
}

#[async_trait]
impl Reconcile<ScanConfigReconcileEvent> for ScanConfigWatcher {
    async fn reconcile(&self, event: &ScanConfigReconcileEvent) -> Result<()> {
        let id = &event.scan_config_id;
        let scan_config = self
            .backend
            .get_scan_config(id)
            .await
            .map_err(|e| e.context("failed to get scan config from API"))?;

        let now = Utc::now();
        if scan_config.is_disabled() {
            tracing::debug!("scan config is disabled");
            return Ok(());
        }
        let Some(operation_time) = scan_config.operation_time() else {
            tracing::debug!("scan config has no scheduled operation time");
            return Ok(());
        };
        if operation_time > now {
            tracing::debug!(%operation_time, "scan config is not due yet");
            return Ok(());
        }

        // Resolved up front so an unusable schedule leaves everything as is.
        let next = match &scan_config.scheduled {
            Some(schedule) => schedule
                .next_after(now)
                .map_err(|e| e.context(format!("failed to reschedule scan config {id}")))?,
            None => None,
        };

        let scans = self
            .backend
            .list_scans(&ListParams::filtered(ScanFilter::ForConfig(id.clone())))
            .await
            .map_err(|e| e.context("failed to get scans from API"))?;

        if has_running_or_completed_scan(&scans, id, operation_time) {
            tracing::debug!("a scan for this config is running or already covers this occurrence");
        } else {
            self.create_scan(id, &scan_config, operation_time).await?;
        }

        self.advance_schedule(id, next).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn scan_of(config: &str) -> Scan {
        Scan {
            scan_config: Some(Reference::new(ScanConfigId::from(config))),
            ..Scan::default()
        }
    }

    #[test]
    fn has_running_or_completed_scan_cases() {
        let config_id = ScanConfigId::from("testID");
        let operation_time = Utc::now();
        let after = operation_time + TimeDelta::minutes(5);
        let before = operation_time - TimeDelta::minutes(5);

        let cases: Vec<(&str, Vec<Scan>, bool)> = vec![
            ("no scans", vec![], false),
            ("only scans of other configs", vec![scan_of("otherID")], false),
            ("scan without end time", vec![scan_of("testID")], true),
            (
                "ended scan started after operation time",
                vec![Scan {
                    start_time: Some(after),
                    end_time: Some(operation_time),
                    ..scan_of("testID")
                }],
                true,
            ),
            (
                "ended scan started before operation time",
                vec![Scan {
                    start_time: Some(before),
                    end_time: Some(operation_time),
                    ..scan_of("testID")
                }],
                false,
            ),
        ];

        for (name, scans, want) in cases {
            assert_eq!(
                has_running_or_completed_scan(&scans, &config_id, operation_time),
                want,
                "{name}"
            );
        }
    }
}
