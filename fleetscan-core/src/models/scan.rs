use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssetScan, Reference, ScanConfigId, ScanId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ScanState {
    Pending,
    Discovered,
    InProgress,
    Aborted,
    Failed,
    Done,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Pending => "Pending",
            ScanState::Discovered => "Discovered",
            ScanState::InProgress => "InProgress",
            ScanState::Aborted => "Aborted",
            ScanState::Failed => "Failed",
            ScanState::Done => "Done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Failed | ScanState::Done)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ScanStateReason {
    Aborted,
    TimedOut,
    OneOrMoreAssetFailedToScan,
    NothingToScan,
    Success,
}

/// Progress counters over the asset scans belonging to a scan.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub jobs_completed: u32,
    pub jobs_left_to_run: u32,
    pub jobs_failed: u32,
}

impl ScanSummary {
    pub fn from_asset_scans(asset_scans: &[AssetScan]) -> Self {
        let mut summary = ScanSummary::default();
        for asset_scan in asset_scans {
            if !asset_scan.is_finished() {
                summary.jobs_left_to_run += 1;
            } else if asset_scan.is_failed() {
                summary.jobs_failed += 1;
            } else {
                summary.jobs_completed += 1;
            }
        }
        summary
    }

    pub fn all_finished(&self) -> bool {
        self.jobs_left_to_run == 0
    }
}

/// A scan campaign over the assets matched by `scope`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ScanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_config: Option<Reference<ScanConfigId>>,
    /// Asset filter expression selecting the assets to scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ScanState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<ScanStateReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Per-scan timeout overriding the watcher default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

impl Scan {
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some() || self.state.is_some_and(|state| state.is_terminal())
    }
}
