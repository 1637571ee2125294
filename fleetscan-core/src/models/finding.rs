use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{AssetId, AssetScanId, Family, FindingId, Reference};

/// Namespace for deterministic finding identifiers.
const FINDING_NAMESPACE: Uuid = Uuid::from_u128(0x5d3c_4a6e_9f1b_4c7d_8e2a_6b0f_1c9d_3e47);

/// A normalized issue derived from one item of a family's results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: FindingId,
    pub asset_scan: Reference<AssetScanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Reference<AssetId>>,
    pub family: Family,
    pub found_on: DateTime<Utc>,
    pub finding_info: Value,
}

impl Finding {
    /// Identifier stable across repeated conversions of the same item.
    ///
    /// `serde_json` keeps object keys sorted, so the encoded item is canonical.
    pub fn derive_id(asset_scan_id: &AssetScanId, family: Family, item: &Value) -> FindingId {
        let name = format!("{}:{}:{}", asset_scan_id, family, item);
        FindingId(Uuid::new_v5(&FINDING_NAMESPACE, name.as_bytes()).to_string())
    }

    pub fn from_item(
        asset_scan_id: &AssetScanId,
        asset_id: Option<&AssetId>,
        family: Family,
        item: &Value,
    ) -> Self {
        Self {
            id: Self::derive_id(asset_scan_id, family, item),
            asset_scan: Reference::new(asset_scan_id.clone()),
            asset: asset_id.cloned().map(Reference::new),
            family,
            found_on: Utc::now(),
            finding_info: item.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_id_ignores_key_order_and_separates_families() {
        let scan = AssetScanId::from("as-1");
        let a = json!({"name": "openssl", "version": "3.0.0"});
        let b: Value = serde_json::from_str(r#"{"version":"3.0.0","name":"openssl"}"#).unwrap();

        assert_eq!(
            Finding::derive_id(&scan, Family::Sbom, &a),
            Finding::derive_id(&scan, Family::Sbom, &b)
        );
        assert_ne!(
            Finding::derive_id(&scan, Family::Sbom, &a),
            Finding::derive_id(&scan, Family::Vulnerabilities, &a)
        );
        assert_ne!(
            Finding::derive_id(&scan, Family::Sbom, &a),
            Finding::derive_id(&AssetScanId::from("as-2"), Family::Sbom, &a)
        );
    }
}
