use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::filter::{
    AssetFilter, AssetScanFilter, FindingFilter, ODataFilter, ScanConfigFilter, ScanFilter,
};
use super::{ListParams, RecordKind, StateBackend, project};
use crate::error::{OrchestratorError, Result};
use crate::merge_patch;
use crate::models::{
    Asset, AssetId, AssetScan, AssetScanId, Finding, Scan, ScanConfig, ScanConfigId, ScanId,
};

struct StoredDocument {
    revision: u64,
    document: Value,
}

/// Secondary uniqueness key; records sharing a key conflict on create.
type UniqueKey = fn(&Value) -> Option<String>;

struct Collection {
    kind: RecordKind,
    unique: Option<UniqueKey>,
    records: Mutex<BTreeMap<String, StoredDocument>>,
}

impl Collection {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            unique: None,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    fn with_unique(mut self, unique: UniqueKey) -> Self {
        self.unique = Some(unique);
        self
    }

    async fn list<F, R>(&self, params: &ListParams<F>) -> Result<Vec<R>>
    where
        F: ODataFilter<Record = R>,
        R: DeserializeOwned,
    {
        let records = self.records.lock().await;
        let mut out = Vec::new();
        for stored in records.values() {
            let record: R = serde_json::from_value(stored.document.clone())?;
            if let Some(filter) = &params.filter
                && !filter.matches(&record)
            {
                continue;
            }
            match &params.select {
                Some(fields) => out.push(serde_json::from_value(project(
                    &stored.document,
                    fields,
                ))?),
                None => out.push(record),
            }
        }
        Ok(out)
    }

    async fn get<R: DeserializeOwned>(&self, id: &str) -> Result<R> {
        let records = self.records.lock().await;
        let stored = records
            .get(id)
            .ok_or_else(|| OrchestratorError::not_found(self.kind.as_str(), id))?;
        Ok(serde_json::from_value(stored.document.clone())?)
    }

    async fn patch(&self, id: &str, patch: &Value) -> Result<()> {
        let mut records = self.records.lock().await;
        let stored = records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::not_found(self.kind.as_str(), id))?;
        merge_patch::apply(&mut stored.document, patch);
        // The identifier is owned by the store.
        if let Value::Object(fields) = &mut stored.document {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        stored.revision += 1;
        Ok(())
    }

    async fn create<R: Serialize + DeserializeOwned>(&self, record: &R) -> Result<R> {
        let mut document = serde_json::to_value(record)?;
        let Value::Object(fields) = &mut document else {
            return Err(OrchestratorError::Internal(format!(
                "{} is not a JSON object",
                self.kind
            )));
        };
        let id = match fields.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&id) {
            return Err(self.conflict(&id, &existing.document));
        }
        if let Some(unique) = self.unique
            && let Some(key) = unique(&document)
            && let Some((existing_id, existing)) = records
                .iter()
                .find(|(_, stored)| unique(&stored.document).as_deref() == Some(key.as_str()))
        {
            return Err(self.conflict(existing_id, &existing.document));
        }

        let created = serde_json::from_value(document.clone())?;
        records.insert(
            id,
            StoredDocument {
                revision: 1,
                document,
            },
        );
        Ok(created)
    }

    fn conflict(&self, id: &str, existing: &Value) -> OrchestratorError {
        OrchestratorError::Conflict {
            kind: self.kind.as_str(),
            id: id.to_string(),
            existing: Some(existing.clone()),
        }
    }

    async fn revision(&self, id: &str) -> Option<u64> {
        self.records.lock().await.get(id).map(|stored| stored.revision)
    }

    async fn document(&self, id: &str) -> Option<Value> {
        self.records
            .lock()
            .await
            .get(id)
            .map(|stored| stored.document.clone())
    }

    async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

fn asset_scan_unique_key(document: &Value) -> Option<String> {
    let scan = document.pointer("/scan/id")?.as_str()?;
    let asset = document.pointer("/asset/id")?.as_str()?;
    Some(format!("{scan}/{asset}"))
}

/// Assets are identified by their kind, instance id and location.
fn asset_unique_key(document: &Value) -> Option<String> {
    let info = document.get("assetInfo")?;
    let object_type = info.get("objectType")?.as_str()?;
    let instance = info.get("instanceID")?.as_str()?;
    let location = info.get("location").and_then(Value::as_str).unwrap_or_default();
    Some(format!("{object_type}/{location}/{instance}"))
}

/// State store kept in process memory.
///
/// Records are stored as raw JSON documents and updated with
/// [`merge_patch::apply`], so fields unknown to the typed models survive
/// patches exactly as they would on the real API. Every write bumps a
/// per-record revision.
pub struct MemoryBackend {
    asset_scans: Collection,
    scans: Collection,
    scan_configs: Collection,
    assets: Collection,
    findings: Collection,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            asset_scans: Collection::new(RecordKind::AssetScan)
                .with_unique(asset_scan_unique_key),
            scans: Collection::new(RecordKind::Scan),
            scan_configs: Collection::new(RecordKind::ScanConfig),
            assets: Collection::new(RecordKind::Asset).with_unique(asset_unique_key),
            findings: Collection::new(RecordKind::Finding),
        }
    }

    fn collection(&self, kind: RecordKind) -> &Collection {
        match kind {
            RecordKind::AssetScan => &self.asset_scans,
            RecordKind::Scan => &self.scans,
            RecordKind::ScanConfig => &self.scan_configs,
            RecordKind::Asset => &self.assets,
            RecordKind::Finding => &self.findings,
        }
    }

    /// Number of writes applied to a record, starting at 1 on create.
    pub async fn revision(&self, kind: RecordKind, id: &str) -> Option<u64> {
        self.collection(kind).revision(id).await
    }

    /// Raw stored document, including fields the models do not know about.
    pub async fn document(&self, kind: RecordKind, id: &str) -> Option<Value> {
        self.collection(kind).document(id).await
    }

    pub async fn count(&self, kind: RecordKind) -> usize {
        self.collection(kind).len().await
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn list_asset_scans(
        &self,
        params: &ListParams<AssetScanFilter>,
    ) -> Result<Vec<AssetScan>> {
        self.asset_scans.list(params).await
    }

    async fn get_asset_scan(&self, id: &AssetScanId) -> Result<AssetScan> {
        self.asset_scans.get(id.as_str()).await
    }

    async fn patch_asset_scan(&self, id: &AssetScanId, patch: &Value) -> Result<()> {
        self.asset_scans.patch(id.as_str(), patch).await
    }

    async fn create_asset_scan(&self, asset_scan: &AssetScan) -> Result<AssetScan> {
        self.asset_scans.create(asset_scan).await
    }

    async fn list_scans(&self, params: &ListParams<ScanFilter>) -> Result<Vec<Scan>> {
        self.scans.list(params).await
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Scan> {
        self.scans.get(id.as_str()).await
    }

    async fn patch_scan(&self, id: &ScanId, patch: &Value) -> Result<()> {
        self.scans.patch(id.as_str(), patch).await
    }

    async fn create_scan(&self, scan: &Scan) -> Result<Scan> {
        self.scans.create(scan).await
    }

    async fn list_scan_configs(
        &self,
        params: &ListParams<ScanConfigFilter>,
    ) -> Result<Vec<ScanConfig>> {
        self.scan_configs.list(params).await
    }

    async fn get_scan_config(&self, id: &ScanConfigId) -> Result<ScanConfig> {
        self.scan_configs.get(id.as_str()).await
    }

    async fn patch_scan_config(&self, id: &ScanConfigId, patch: &Value) -> Result<()> {
        self.scan_configs.patch(id.as_str(), patch).await
    }

    async fn create_scan_config(&self, scan_config: &ScanConfig) -> Result<ScanConfig> {
        self.scan_configs.create(scan_config).await
    }

    async fn list_assets(&self, params: &ListParams<AssetFilter>) -> Result<Vec<Asset>> {
        self.assets.list(params).await
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Asset> {
        self.assets.get(id.as_str()).await
    }

    async fn patch_asset(&self, id: &AssetId, patch: &Value) -> Result<()> {
        self.assets.patch(id.as_str(), patch).await
    }

    async fn create_asset(&self, asset: &Asset) -> Result<Asset> {
        self.assets.create(asset).await
    }

    async fn list_findings(&self, params: &ListParams<FindingFilter>) -> Result<Vec<Finding>> {
        self.findings.list(params).await
    }

    async fn create_finding(&self, finding: &Finding) -> Result<Finding> {
        self.findings.create(finding).await
    }
}
