//! Access to the remote state store.
//!
//! Controllers talk to the store exclusively through [`StateBackend`].
//! Updates are partial JSON documents applied with merge-patch semantics, so
//! a controller only ever writes the fields it owns.

pub mod filter;
pub mod http;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    Asset, AssetId, AssetScan, AssetScanId, Finding, Scan, ScanConfig, ScanConfigId, ScanId,
};

pub use filter::{
    AssetFilter, AssetScanFilter, FindingFilter, ODataFilter, ScanConfigFilter, ScanFilter,
};
pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Record collections exposed by the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    AssetScan,
    Scan,
    ScanConfig,
    Asset,
    Finding,
}

impl RecordKind {
    /// Human readable name used in errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::AssetScan => "asset scan",
            RecordKind::Scan => "scan",
            RecordKind::ScanConfig => "scan config",
            RecordKind::Asset => "asset",
            RecordKind::Finding => "finding",
        }
    }

    /// Collection segment of the REST API.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::AssetScan => "assetScans",
            RecordKind::Scan => "scans",
            RecordKind::ScanConfig => "scanConfigs",
            RecordKind::Asset => "assets",
            RecordKind::Finding => "findings",
        }
    }

    /// Field of a 409 response body carrying the conflicting record.
    pub fn conflict_field(&self) -> &'static str {
        match self {
            RecordKind::AssetScan => "assetScan",
            RecordKind::Scan => "scan",
            RecordKind::ScanConfig => "scanConfig",
            RecordKind::Asset => "asset",
            RecordKind::Finding => "finding",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query options for list operations.
#[derive(Clone, Debug)]
pub struct ListParams<F> {
    pub filter: Option<F>,
    /// Restricts the returned documents to these fields (`a/b` for nested).
    pub select: Option<Vec<String>>,
}

impl<F> Default for ListParams<F> {
    fn default() -> Self {
        Self {
            filter: None,
            select: None,
        }
    }
}

impl<F> ListParams<F> {
    pub fn filtered(filter: F) -> Self {
        Self {
            filter: Some(filter),
            select: None,
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|field| field.to_string()).collect());
        self
    }
}

impl<F: ODataFilter> ListParams<F> {
    pub fn odata_filter(&self) -> Option<String> {
        self.filter.as_ref().map(|filter| filter.to_odata())
    }

    pub fn odata_select(&self) -> Option<String> {
        self.select.as_ref().map(|fields| fields.join(","))
    }
}

/// Operations the controllers need from the remote state API.
///
/// `patch_*` methods take a merge-patch document: `null` deletes a field and
/// absent fields are left untouched. `create_*` methods fail with
/// [`crate::error::OrchestratorError::Conflict`] when the record already
/// exists.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn list_asset_scans(&self, params: &ListParams<AssetScanFilter>)
    -> Result<Vec<AssetScan>>;
    async fn get_asset_scan(&self, id: &AssetScanId) -> Result<AssetScan>;
    async fn patch_asset_scan(&self, id: &AssetScanId, patch: &Value) -> Result<()>;
    async fn create_asset_scan(&self, asset_scan: &AssetScan) -> Result<AssetScan>;

    async fn list_scans(&self, params: &ListParams<ScanFilter>) -> Result<Vec<Scan>>;
    async fn get_scan(&self, id: &ScanId) -> Result<Scan>;
    async fn patch_scan(&self, id: &ScanId, patch: &Value) -> Result<()>;
    async fn create_scan(&self, scan: &Scan) -> Result<Scan>;

    async fn list_scan_configs(&self, params: &ListParams<ScanConfigFilter>)
    -> Result<Vec<ScanConfig>>;
    async fn get_scan_config(&self, id: &ScanConfigId) -> Result<ScanConfig>;
    async fn patch_scan_config(&self, id: &ScanConfigId, patch: &Value) -> Result<()>;
    async fn create_scan_config(&self, scan_config: &ScanConfig) -> Result<ScanConfig>;

    async fn list_assets(&self, params: &ListParams<AssetFilter>) -> Result<Vec<Asset>>;
    async fn get_asset(&self, id: &AssetId) -> Result<Asset>;
    async fn patch_asset(&self, id: &AssetId, patch: &Value) -> Result<()>;
    async fn create_asset(&self, asset: &Asset) -> Result<Asset>;

    async fn list_findings(&self, params: &ListParams<FindingFilter>) -> Result<Vec<Finding>>;
    async fn create_finding(&self, finding: &Finding) -> Result<Finding>;
}

/// Keeps only `fields` of a JSON object. Nested fields use `/` separators.
pub(crate) fn project(document: &Value, fields: &[String]) -> Value {
    let mut projected = Value::Object(serde_json::Map::new());
    for field in fields {
        let segments: Vec<&str> = field.split('/').filter(|s| !s.is_empty()).collect();
        copy_path(document, &mut projected, &segments);
    }
    projected
}

fn copy_path(source: &Value, target: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let (Some(value), Value::Object(target_fields)) = (source.get(*head), target) else {
        return;
    };
    if rest.is_empty() {
        target_fields.insert(head.to_string(), value.clone());
        return;
    }
    let child = target_fields
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    copy_path(value, child, rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_keeps_only_selected_paths() {
        let doc = json!({
            "id": "as-1",
            "status": {"general": {"state": "Done"}, "sbom": {"state": "Done"}},
            "findingsProcessed": false
        });
        let fields = vec!["id".to_string(), "status/general".to_string(), "missing".to_string()];
        assert_eq!(
            project(&doc, &fields),
            json!({"id": "as-1", "status": {"general": {"state": "Done"}}})
        );
    }

    #[test]
    fn list_params_render_query_values() {
        let params = ListParams::filtered(AssetScanFilter::FindingsPending).select(&["id"]);
        assert_eq!(
            params.odata_filter().as_deref(),
            Some(
                "status/general/state eq 'Done' and (findingsProcessed eq false or findingsProcessed eq null)"
            )
        );
        assert_eq!(params.odata_select().as_deref(), Some("id"));
    }
}
