use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AssetId, AssetScanId, Family, Reference, ScanId};

/// Lifecycle state of an asset scan, overall or per family.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AssetScanState {
    Pending,
    Scheduled,
    ReadyToScan,
    InProgress,
    Aborted,
    NotScanned,
    Done,
}

impl AssetScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetScanState::Pending => "Pending",
            AssetScanState::Scheduled => "Scheduled",
            AssetScanState::ReadyToScan => "ReadyToScan",
            AssetScanState::InProgress => "InProgress",
            AssetScanState::Aborted => "Aborted",
            AssetScanState::NotScanned => "NotScanned",
            AssetScanState::Done => "Done",
        }
    }

    /// Scanner workers will not move the record any further.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            AssetScanState::Done | AssetScanState::Aborted | AssetScanState::NotScanned
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AssetScanState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl FamilyStatus {
    pub fn new(state: AssetScanState) -> Self {
        Self {
            state: Some(state),
            errors: None,
            last_transition_time: Some(Utc::now()),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    /// `Done` with an empty or missing error list.
    pub fn completed_without_errors(&self) -> bool {
        self.state == Some(AssetScanState::Done) && !self.has_errors()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScanStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbom: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploits: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malware: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootkits: Option<FamilyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconfigurations: Option<FamilyStatus>,
}

impl AssetScanStatus {
    pub fn family(&self, family: Family) -> Option<&FamilyStatus> {
        match family {
            Family::Vulnerabilities => self.vulnerabilities.as_ref(),
            Family::Sbom => self.sbom.as_ref(),
            Family::Exploits => self.exploits.as_ref(),
            Family::Secrets => self.secrets.as_ref(),
            Family::Malware => self.malware.as_ref(),
            Family::Rootkits => self.rootkits.as_ref(),
            Family::Misconfigurations => self.misconfigurations.as_ref(),
        }
    }

    pub fn family_mut(&mut self, family: Family) -> &mut Option<FamilyStatus> {
        match family {
            Family::Vulnerabilities => &mut self.vulnerabilities,
            Family::Sbom => &mut self.sbom,
            Family::Exploits => &mut self.exploits,
            Family::Secrets => &mut self.secrets,
            Family::Malware => &mut self.malware,
            Family::Rootkits => &mut self.rootkits,
            Family::Misconfigurations => &mut self.misconfigurations,
        }
    }
}

/// Raw output of one family, as reported by the scanner worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyResult {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Remote record of one scan execution against one asset.
///
/// Every field is optional so that the same type doubles as a partial
/// document for merge-patch updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssetScanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<Reference<ScanId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Reference<AssetId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetScanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings_processed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<Family, FamilyResult>>,
}

impl AssetScan {
    pub fn general_state(&self) -> Option<AssetScanState> {
        self.status
            .as_ref()
            .and_then(|status| status.general.as_ref())
            .and_then(|general| general.state)
    }

    pub fn family_status(&self, family: Family) -> Option<&FamilyStatus> {
        self.status.as_ref().and_then(|status| status.family(family))
    }

    pub fn is_findings_processed(&self) -> bool {
        self.findings_processed == Some(true)
    }

    pub fn is_finished(&self) -> bool {
        self.general_state()
            .is_some_and(|state| state.is_finished())
    }

    /// Finished, but aborted or carrying errors on the general status.
    pub fn is_failed(&self) -> bool {
        let general = self.status.as_ref().and_then(|status| status.general.as_ref());
        match general {
            Some(general) => match general.state {
                Some(AssetScanState::Aborted) | Some(AssetScanState::NotScanned) => true,
                Some(AssetScanState::Done) => general.has_errors(),
                _ => false,
            },
            None => false,
        }
    }

    pub fn family_items(&self, family: Family) -> &[Value] {
        self.results
            .as_ref()
            .and_then(|results| results.get(&family))
            .map(|result| result.items.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_without_errors_requires_done_and_no_errors() {
        assert!(FamilyStatus::new(AssetScanState::Done).completed_without_errors());
        assert!(
            FamilyStatus::new(AssetScanState::Done)
                .with_errors(vec![])
                .completed_without_errors()
        );
        assert!(
            !FamilyStatus::new(AssetScanState::Done)
                .with_errors(vec!["scanner crashed".into()])
                .completed_without_errors()
        );
        assert!(!FamilyStatus::new(AssetScanState::InProgress).completed_without_errors());
        assert!(!FamilyStatus::default().completed_without_errors());
    }

    #[test]
    fn decodes_wire_shape() {
        let raw = json!({
            "id": "as-1",
            "scan": {"id": "scan-1"},
            "asset": {"id": "asset-1"},
            "status": {
                "general": {"state": "Done"},
                "sbom": {"state": "Done", "errors": []},
                "malware": {"state": "InProgress"}
            },
            "results": {"sbom": {"items": [{"name": "openssl", "version": "3.0.0"}]}},
            "somethingNew": true
        });

        let scan: AssetScan = serde_json::from_value(raw).unwrap();
        assert_eq!(scan.id, Some(AssetScanId::from("as-1")));
        assert_eq!(scan.general_state(), Some(AssetScanState::Done));
        assert!(scan.family_status(Family::Sbom).unwrap().completed_without_errors());
        assert!(!scan.family_status(Family::Malware).unwrap().completed_without_errors());
        assert_eq!(scan.family_items(Family::Sbom).len(), 1);
        assert!(scan.family_items(Family::Secrets).is_empty());
        assert_eq!(scan.findings_processed, None);
    }

    #[test]
    fn partial_document_only_carries_set_fields() {
        let patch = AssetScan {
            findings_processed: Some(true),
            ..AssetScan::default()
        };
        assert_eq!(
            serde_json::to_value(patch).unwrap(),
            json!({"findingsProcessed": true})
        );
    }
}
