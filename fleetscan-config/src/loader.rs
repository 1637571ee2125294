use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleetscan_core::OrchestratorError;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BACKEND_ADDRESS, DEFAULT_CONFIG_LOCATIONS, DEFAULT_LOG_FILTER, ENV_CONFIG_PATH,
};
use crate::models::{
    BackendConfig, Config, ConfigMetadata, ConfigSource, ConfigWarning, LogConfig,
};
use crate::sources::{EnvConfig, FileConfig};

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Explicit config file; takes precedence over `FLEETSCAN_CONFIG_PATH`.
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub skip_env_file: bool,
    /// Directory the default config locations are resolved against.
    pub search_dir: Option<PathBuf>,
}

/// Resolves a [`Config`] from `.env`, files, inline JSON and defaults.
#[derive(Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
    lookup: Option<EnvLookup>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("options", &self.options)
            .field("custom_env", &self.lookup.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self {
            options,
            lookup: None,
        }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.options.skip_env_file = true;
        self
    }

    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.search_dir = Some(dir.into());
        self
    }

    /// Replaces the process environment as the source of `FLEETSCAN_*`
    /// variables.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let env = match &self.lookup {
            Some(lookup) => EnvConfig::gather_with(|key| lookup(key)),
            None => EnvConfig::gather(),
        };

        let (file_config, source) = self.load_file_config(&env)?;

        let mut warnings = Vec::new();
        if source == ConfigSource::Defaults {
            warnings.push(
                ConfigWarning::new("No fleetscan config file detected; using defaults")
                    .with_hint(format!(
                        "Create fleetscan.toml or point {ENV_CONFIG_PATH} at a config file"
                    )),
            );
        }

        let config = compose_config(file_config, env, source, env_file_loaded);
        config.validate()?;
        tracing::debug!(source = ?config.metadata.source, "configuration loaded");

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if self.options.skip_env_file {
            return Ok(false);
        }
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path),
            None => dotenvy::dotenv().map(|_| ()),
        };
        match loaded {
            Ok(()) => Ok(true),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, ConfigSource), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            let file_config = read_file_config(&path)?;
            return Ok((file_config, ConfigSource::File(path)));
        }

        if let Some(raw) = &env.config_json {
            let file_config = serde_json::from_str(raw)
                .map_err(|source| ConfigLoadError::InlineJson { source })?;
            return Ok((file_config, ConfigSource::InlineJson));
        }

        let root = self.options.search_dir.clone().unwrap_or_default();
        let found = DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|candidate| candidate.is_file());
        match found {
            Some(path) => {
                let file_config = read_file_config(&path)?;
                Ok((file_config, ConfigSource::File(path)))
            }
            None => Ok((FileConfig::default(), ConfigSource::Defaults)),
        }
    }
}

/// Parses by extension; unknown extensions are tried as TOML, then JSON.
fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);

    let parse_toml = |contents: &str| -> Result<FileConfig, ConfigLoadError> {
        toml::from_str(contents).map_err(|source| ConfigLoadError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    };
    match extension.as_deref() {
        Some("toml") => parse_toml(&contents),
        Some("json") => {
            serde_json::from_str(&contents).map_err(|source| ConfigLoadError::ParseJson {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => parse_toml(&contents).or_else(|toml_err| {
            serde_json::from_str(&contents).map_err(|_| toml_err)
        }),
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    source: ConfigSource,
    env_file_loaded: bool,
) -> Config {
    let FileConfig {
        backend: file_backend,
        orchestrator,
        log: file_log,
    } = file;

    Config {
        backend: BackendConfig {
            address: env
                .backend_address
                .or(file_backend.address)
                .unwrap_or_else(|| DEFAULT_BACKEND_ADDRESS.to_string()),
        },
        orchestrator,
        log: LogConfig {
            filter: env
                .log_filter
                .or(file_log.filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        },
        metadata: ConfigMetadata {
            source,
            env_file_loaded,
        },
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {}", path.display())]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {}", path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse configuration {}", path.display())]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse inline configuration JSON")]
    InlineJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid backend address '{address}'")]
    InvalidBackendAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("backend address '{address}' must use http or https, not {scheme}")]
    UnsupportedScheme { address: String, scheme: String },
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
