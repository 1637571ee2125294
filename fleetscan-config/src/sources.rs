use std::path::PathBuf;

use fleetscan_core::orchestration::OrchestratorConfig;
use serde::{Deserialize, Serialize};

use crate::constants::{ENV_BACKEND_ADDRESS, ENV_CONFIG_JSON, ENV_CONFIG_PATH, ENV_LOG};

/// Raw configuration as written in a TOML or JSON document.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub backend: FileBackendConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub log: FileLogConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileBackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileLogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Values picked up from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub backend_address: Option<String>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::gather_with(|key| std::env::var(key).ok())
    }

    /// Reads through `lookup`; blank values count as unset.
    pub fn gather_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            config_path: get(ENV_CONFIG_PATH).map(PathBuf::from),
            config_json: get(ENV_CONFIG_JSON),
            backend_address: get(ENV_BACKEND_ADDRESS),
            log_filter: get(ENV_LOG),
        }
    }
}
