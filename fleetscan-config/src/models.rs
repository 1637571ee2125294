use std::path::PathBuf;

use fleetscan_core::orchestration::OrchestratorConfig;
use url::Url;

use crate::constants::{DEFAULT_BACKEND_ADDRESS, DEFAULT_LOG_FILTER};
use crate::loader::ConfigLoadError;

/// Fully resolved orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    pub orchestrator: OrchestratorConfig,
    pub log: LogConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Rejects addresses the HTTP backend cannot use and zero-valued knobs.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let url = Url::parse(&self.backend.address).map_err(|source| {
            ConfigLoadError::InvalidBackendAddress {
                address: self.backend.address.clone(),
                source,
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigLoadError::UnsupportedScheme {
                address: self.backend.address.clone(),
                scheme: url.scheme().to_string(),
            });
        }
        self.orchestrator.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL of the state API, e.g. `http://localhost:8888/api`.
    pub address: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BACKEND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Where the settings came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    File(PathBuf),
    InlineJson,
    #[default]
    Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

impl ConfigMetadata {
    pub fn config_path(&self) -> Option<&PathBuf> {
        match &self.source {
            ConfigSource::File(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl ConfigWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
