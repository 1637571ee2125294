use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::filter::{
    AssetFilter, AssetScanFilter, FindingFilter, ODataFilter, ScanConfigFilter, ScanFilter,
};
use super::{ListParams, RecordKind, StateBackend};
use crate::error::{OrchestratorError, Result};
use crate::models::{
    Asset, AssetId, AssetScan, AssetScanId, Finding, Scan, ScanConfig, ScanConfigId, ScanId,
};

const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

#[derive(Debug, Deserialize)]
struct ListResponse<R> {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default = "Vec::new")]
    items: Vec<R>,
}

/// State store client for the REST API.
///
/// Collections live under the base URL (`{base}/assetScans`, `{base}/scans`,
/// ...). Lists accept `$filter`/`$select` and answer `{count, items}`; a 404
/// maps to `NotFound` and a 409 to `Conflict`.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            OrchestratorError::InvalidConfig(format!("invalid backend address {base_url}: {e}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(OrchestratorError::InvalidConfig(format!(
                "backend address must be http or https: {base_url}"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, kind: RecordKind, id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                OrchestratorError::InvalidConfig(format!(
                    "backend address cannot be a base: {}",
                    self.base_url
                ))
            })?;
            segments.pop_if_empty().push(kind.collection());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn list<F, R>(&self, kind: RecordKind, params: &ListParams<F>) -> Result<Vec<R>>
    where
        F: ODataFilter,
        R: DeserializeOwned,
    {
        let mut request = self.client.get(self.url(kind, None)?);
        if let Some(filter) = params.odata_filter() {
            request = request.query(&[("$filter", filter)]);
        }
        if let Some(select) = params.odata_select() {
            request = request.query(&[("$select", select)]);
        }
        let response = self.send(kind, None, request).await?;
        let list: ListResponse<R> = response.json().await?;
        debug!(
            kind = kind.as_str(),
            count = list.count,
            items = list.items.len(),
            "listed records"
        );
        Ok(list.items)
    }

    async fn get<R: DeserializeOwned>(&self, kind: RecordKind, id: &str) -> Result<R> {
        let request = self.client.get(self.url(kind, Some(id))?);
        let response = self.send(kind, Some(id), request).await?;
        Ok(response.json().await?)
    }

    async fn patch(&self, kind: RecordKind, id: &str, patch: &Value) -> Result<()> {
        let request = self
            .client
            .patch(self.url(kind, Some(id))?)
            .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(serde_json::to_vec(patch)?);
        self.send(kind, Some(id), request).await?;
        Ok(())
    }

    async fn create<R>(&self, kind: RecordKind, record: &R) -> Result<R>
    where
        R: Serialize + DeserializeOwned,
    {
        let request = self.client.post(self.url(kind, None)?).json(record);
        let response = self.send(kind, None, request).await?;
        Ok(response.json().await?)
    }

    async fn send(
        &self,
        kind: RecordKind,
        id: Option<&str>,
        request: RequestBuilder,
    ) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(kind = kind.as_str(), id, status = status.as_u16(), "backend response");

        match status {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(OrchestratorError::not_found(
                kind.as_str(),
                id.unwrap_or_default(),
            )),
            StatusCode::CONFLICT => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let existing = body.get(kind.conflict_field()).cloned();
                let conflicting_id = existing
                    .as_ref()
                    .and_then(|record| record.get("id"))
                    .and_then(Value::as_str)
                    .or(id)
                    .unwrap_or_default()
                    .to_string();
                Err(OrchestratorError::Conflict {
                    kind: kind.as_str(),
                    id: conflicting_id,
                    existing,
                })
            }
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(OrchestratorError::Backend {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl StateBackend for HttpBackend {
    async fn list_asset_scans(
        &self,
        params: &ListParams<AssetScanFilter>,
    ) -> Result<Vec<AssetScan>> {
        self.list(RecordKind::AssetScan, params).await
    }

    async fn get_asset_scan(&self, id: &AssetScanId) -> Result<AssetScan> {
        self.get(RecordKind::AssetScan, id.as_str()).await
    }

    async fn patch_asset_scan(&self, id: &AssetScanId, patch: &Value) -> Result<()> {
        self.patch(RecordKind::AssetScan, id.as_str(), patch).await
    }

    async fn create_asset_scan(&self, asset_scan: &AssetScan) -> Result<AssetScan> {
        self.create(RecordKind::AssetScan, asset_scan).await
    }

    async fn list_scans(&self, params: &ListParams<ScanFilter>) -> Result<Vec<Scan>> {
        self.list(RecordKind::Scan, params).await
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Scan> {
        self.get(RecordKind::Scan, id.as_str()).await
    }

    async fn patch_scan(&self, id: &ScanId, patch: &Value) -> Result<()> {
        self.patch(RecordKind::Scan, id.as_str(), patch).await
    }

    async fn create_scan(&self, scan: &Scan) -> Result<Scan> {
        self.create(RecordKind::Scan, scan).await
    }

    async fn list_scan_configs(
        &self,
        params: &ListParams<ScanConfigFilter>,
    ) -> Result<Vec<ScanConfig>> {
        self.list(RecordKind::ScanConfig, params).await
    }

    async fn get_scan_config(&self, id: &ScanConfigId) -> Result<ScanConfig> {
        self.get(RecordKind::ScanConfig, id.as_str()).await
    }

    async fn patch_scan_config(&self, id: &ScanConfigId, patch: &Value) -> Result<()> {
        self.patch(RecordKind::ScanConfig, id.as_str(), patch).await
    }

    async fn create_scan_config(&self, scan_config: &ScanConfig) -> Result<ScanConfig> {
        self.create(RecordKind::ScanConfig, scan_config).await
    }

    async fn list_assets(&self, params: &ListParams<AssetFilter>) -> Result<Vec<Asset>> {
        self.list(RecordKind::Asset, params).await
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Asset> {
        self.get(RecordKind::Asset, id.as_str()).await
    }

    async fn patch_asset(&self, id: &AssetId, patch: &Value) -> Result<()> {
        self.patch(RecordKind::Asset, id.as_str(), patch).await
    }

    async fn create_asset(&self, asset: &Asset) -> Result<Asset> {
        self.create(RecordKind::Asset, asset).await
    }

    async fn list_findings(&self, params: &ListParams<FindingFilter>) -> Result<Vec<Finding>> {
        self.list(RecordKind::Finding, params).await
    }

    async fn create_finding(&self, finding: &Finding) -> Result<Finding> {
        self.create(RecordKind::Finding, finding).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_under_the_base_path() {
        let backend = HttpBackend::new("http://localhost:8888/api").unwrap();
        assert_eq!(
            backend.url(RecordKind::AssetScan, Some("as-1")).unwrap().as_str(),
            "http://localhost:8888/api/assetScans/as-1"
        );
        assert_eq!(
            backend.url(RecordKind::ScanConfig, None).unwrap().as_str(),
            "http://localhost:8888/api/scanConfigs"
        );
    }

    #[test]
    fn ids_are_percent_encoded() {
        let backend = HttpBackend::new("http://localhost:8888/").unwrap();
        assert_eq!(
            backend.url(RecordKind::Asset, Some("a b/c")).unwrap().as_str(),
            "http://localhost:8888/assets/a%20b%2Fc"
        );
    }

    #[test]
    fn rejects_non_http_addresses() {
        assert!(HttpBackend::new("ftp://example.com").is_err());
        assert!(HttpBackend::new("not a url").is_err());
    }
}
