use std::fmt;

use serde::{Deserialize, Serialize};

/// Scan discipline whose results are post-processed into findings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Family {
    Vulnerabilities,
    Sbom,
    Exploits,
    Secrets,
    Malware,
    Rootkits,
    Misconfigurations,
}

impl Family {
    /// Families in the order the asset scan processor converts them.
    pub const ALL: [Family; 7] = [
        Family::Vulnerabilities,
        Family::Sbom,
        Family::Exploits,
        Family::Secrets,
        Family::Malware,
        Family::Rootkits,
        Family::Misconfigurations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Vulnerabilities => "vulnerabilities",
            Family::Sbom => "sbom",
            Family::Exploits => "exploits",
            Family::Secrets => "secrets",
            Family::Malware => "malware",
            Family::Rootkits => "rootkits",
            Family::Misconfigurations => "misconfigurations",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
