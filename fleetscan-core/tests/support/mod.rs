//! Shared fixtures for controller integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use fleetscan_core::backend::{MemoryBackend, StateBackend};
use fleetscan_core::error::{OrchestratorError, Result};
use fleetscan_core::findings::{FindingsConverter, ResultFindingsConverter};
use fleetscan_core::models::{
    AssetId, AssetScan, AssetScanId, AssetScanState, AssetScanStatus, Family, FamilyResult,
    FamilyStatus, Reference, ScanId,
};
use fleetscan_core::orchestration::ControllerConfig;

/// Fast knobs for loop-driven tests.
pub fn fast_controller() -> ControllerConfig {
    ControllerConfig {
        poll_period_ms: 10,
        reconcile_timeout_ms: 2_000,
        workers: 2,
    }
}

/// Builds an asset scan whose overall state is `Done` and whose families
/// carry the given status. Every listed family gets two result items.
pub fn finished_asset_scan(id: &str, families: &[(Family, FamilyStatus)]) -> AssetScan {
    let mut status = AssetScanStatus {
        general: Some(FamilyStatus::new(AssetScanState::Done)),
        ..AssetScanStatus::default()
    };
    let mut results = BTreeMap::new();
    for (family, family_status) in families {
        *status.family_mut(*family) = Some(family_status.clone());
        results.insert(
            *family,
            FamilyResult {
                items: vec![
                    json!({"family": family.as_str(), "n": 1}),
                    json!({"family": family.as_str(), "n": 2}),
                ],
            },
        );
    }

    AssetScan {
        id: Some(AssetScanId::from(id)),
        scan: Some(Reference::new(ScanId::from("scan-1"))),
        asset: Some(Reference::new(AssetId::from(format!("asset-of-{id}")))),
        status: Some(status),
        results: Some(results),
        ..AssetScan::default()
    }
}

pub fn done() -> FamilyStatus {
    FamilyStatus::new(AssetScanState::Done)
}

pub fn all_families_done(id: &str) -> AssetScan {
    let families: Vec<_> = Family::ALL.iter().map(|family| (*family, done())).collect();
    finished_asset_scan(id, &families)
}

/// Wraps the result converter, recording calls and failing chosen families.
pub struct RecordingConverter {
    inner: ResultFindingsConverter,
    calls: Mutex<Vec<(AssetScanId, Family)>>,
    failing: Mutex<HashSet<Family>>,
}

impl RecordingConverter {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self {
            inner: ResultFindingsConverter::new(backend),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub async fn fail_on(&self, family: Family) {
        self.failing.lock().await.insert(family);
    }

    pub async fn recover(&self) {
        self.failing.lock().await.clear();
    }

    pub async fn calls(&self) -> Vec<(AssetScanId, Family)> {
        self.calls.lock().await.clone()
    }

    pub async fn converted_families(&self) -> Vec<Family> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|(_, family)| *family)
            .collect()
    }

    pub async fn reset_calls(&self) {
        self.calls.lock().await.clear();
    }
}

#[async_trait]
impl FindingsConverter for RecordingConverter {
    async fn convert(&self, asset_scan: &AssetScan, family: Family) -> Result<()> {
        let id = asset_scan.id.clone().unwrap_or_default();
        self.calls.lock().await.push((id, family));
        if self.failing.lock().await.contains(&family) {
            return Err(OrchestratorError::Backend {
                status: 503,
                message: format!("{family} findings store unavailable"),
            });
        }
        self.inner.convert(asset_scan, family).await
    }
}

pub async fn seed(backend: &MemoryBackend, asset_scan: &AssetScan) {
    backend
        .create_asset_scan(asset_scan)
        .await
        .expect("seed asset scan");
}

/// Polls `check` until it returns true or the deadline passes.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
