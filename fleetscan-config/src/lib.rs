//! Configuration loading for the fleetscan orchestrator.
//!
//! Settings are layered: an optional `.env` file is sourced first, then a
//! TOML or JSON config file (or inline JSON from the environment) is read,
//! and finally a couple of environment overrides are applied on top of the
//! built-in defaults. See [`ConfigLoader`].

pub mod constants;
pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    BackendConfig, Config, ConfigMetadata, ConfigSource, ConfigWarning, LogConfig,
};
