use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AssetId;

/// A cloud asset known to the state store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssetId>,
    /// Provider-specific description; `objectType` discriminates the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_on: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn object_type(&self) -> Option<&str> {
        self.asset_info
            .as_ref()
            .and_then(|info| info.get("objectType"))
            .and_then(Value::as_str)
    }
}
