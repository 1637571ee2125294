//! Typed list filters.
//!
//! Each filter renders the OData `$filter` expression sent to the REST API
//! and can evaluate itself against a decoded record, which is how the
//! in-memory backend answers the same query.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{
    Asset, AssetScan, AssetScanId, AssetScanState, Finding, Scan, ScanConfig, ScanConfigId,
    ScanId,
};

pub trait ODataFilter: Send + Sync {
    type Record;

    fn to_odata(&self) -> String;

    fn matches(&self, record: &Self::Record) -> bool;
}

/// Quotes a string literal, doubling embedded single quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetScanFilter {
    /// Finished asset scans whose findings have not been processed yet.
    FindingsPending,
    /// Every asset scan belonging to a scan.
    ForScan(ScanId),
}

impl ODataFilter for AssetScanFilter {
    type Record = AssetScan;

    fn to_odata(&self) -> String {
        match self {
            AssetScanFilter::FindingsPending => "status/general/state eq 'Done' and \
                 (findingsProcessed eq false or findingsProcessed eq null)"
                .to_string(),
            AssetScanFilter::ForScan(scan_id) => format!("scan/id eq {}", quote(scan_id.as_str())),
        }
    }

    fn matches(&self, record: &AssetScan) -> bool {
        match self {
            AssetScanFilter::FindingsPending => {
                record.general_state() == Some(AssetScanState::Done)
                    && !record.is_findings_processed()
            }
            AssetScanFilter::ForScan(scan_id) => record
                .scan
                .as_ref()
                .is_some_and(|scan| &scan.id == scan_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanFilter {
    /// Scans that have neither ended nor reached a terminal state.
    Unfinished,
    /// Every scan created from a scan config.
    ForConfig(ScanConfigId),
}

impl ODataFilter for ScanFilter {
    type Record = Scan;

    fn to_odata(&self) -> String {
        match self {
            ScanFilter::Unfinished => {
                "endTime eq null and state ne 'Done' and state ne 'Failed'".to_string()
            }
            ScanFilter::ForConfig(config_id) => {
                format!("scanConfig/id eq {}", quote(config_id.as_str()))
            }
        }
    }

    fn matches(&self, record: &Scan) -> bool {
        match self {
            ScanFilter::Unfinished => !record.is_ended(),
            ScanFilter::ForConfig(config_id) => record
                .scan_config
                .as_ref()
                .is_some_and(|config| &config.id == config_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanConfigFilter {
    /// Enabled configs whose next operation time is at or before the instant.
    DueBy(DateTime<Utc>),
}

impl ODataFilter for ScanConfigFilter {
    type Record = ScanConfig;

    fn to_odata(&self) -> String {
        match self {
            ScanConfigFilter::DueBy(now) => format!(
                "(disabled eq null or disabled eq false) and scheduled/operationTime le {}",
                timestamp(now)
            ),
        }
    }

    fn matches(&self, record: &ScanConfig) -> bool {
        match self {
            ScanConfigFilter::DueBy(now) => {
                !record.is_disabled()
                    && record
                        .operation_time()
                        .is_some_and(|operation_time| operation_time <= *now)
            }
        }
    }
}

/// Live assets, optionally narrowed to one `assetInfo.objectType`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub scope: Option<String>,
}

impl AssetFilter {
    pub fn in_scope(scope: Option<&str>) -> Self {
        Self {
            scope: scope.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

impl ODataFilter for AssetFilter {
    type Record = Asset;

    fn to_odata(&self) -> String {
        match &self.scope {
            Some(scope) => format!(
                "terminatedOn eq null and assetInfo/objectType eq {}",
                quote(scope)
            ),
            None => "terminatedOn eq null".to_string(),
        }
    }

    fn matches(&self, record: &Asset) -> bool {
        if record.terminated_on.is_some() {
            return false;
        }
        match &self.scope {
            Some(scope) => record.object_type() == Some(scope.as_str()),
            None => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FindingFilter {
    ForAssetScan(AssetScanId),
}

impl ODataFilter for FindingFilter {
    type Record = Finding;

    fn to_odata(&self) -> String {
        match self {
            FindingFilter::ForAssetScan(id) => format!("assetScan/id eq {}", quote(id.as_str())),
        }
    }

    fn matches(&self, record: &Finding) -> bool {
        match self {
            FindingFilter::ForAssetScan(id) => &record.asset_scan.id == id,
        }
    }
}
