use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Global knobs for the controllers started by the orchestrator.
///
/// Every field carries a default so a deployment only has to spell out the
/// values it wants to change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Post-processing of finished asset scans into findings.
    pub asset_scan_processor: ControllerConfig,
    /// Scan lifecycle transitions (discovery, progress, timeout, abort).
    pub scan_watcher: ScanWatcherConfig,
    /// Scheduled scan creation from scan configs.
    pub scan_config_watcher: ControllerConfig,
    /// Upper bound for joining loop tasks on shutdown (ms).
    pub shutdown_grace_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            asset_scan_processor: ControllerConfig::default(),
            scan_watcher: ScanWatcherConfig::default(),
            scan_config_watcher: ControllerConfig::default(),
            shutdown_grace_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.asset_scan_processor.validate("asset_scan_processor")?;
        self.scan_watcher.validate()?;
        self.scan_config_watcher.validate("scan_config_watcher")?;
        Ok(())
    }
}

/// Poll/reconcile tuning shared by every controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Delay between discovery polls (ms).
    pub poll_period_ms: u64,
    /// Deadline for a single reconcile attempt (ms).
    pub reconcile_timeout_ms: u64,
    /// Number of concurrent reconcile workers.
    pub workers: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: 15_000,
            reconcile_timeout_ms: 300_000,
            workers: 1,
        }
    }
}

impl ControllerConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile_timeout_ms)
    }

    pub fn validate(&self, controller: &str) -> Result<()> {
        if self.poll_period_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{controller}.poll_period_ms must be greater than zero"
            )));
        }
        if self.reconcile_timeout_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{controller}.reconcile_timeout_ms must be greater than zero"
            )));
        }
        if self.workers == 0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{controller}.workers must be greater than zero"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanWatcherConfig {
    pub controller: ControllerConfig,
    /// Scans running longer than this are failed with `TimedOut` unless the
    /// scan carries its own timeout (seconds).
    pub scan_timeout_secs: u64,
}

impl Default for ScanWatcherConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            scan_timeout_secs: 48 * 60 * 60,
        }
    }
}

impl ScanWatcherConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.controller.validate("scan_watcher.controller")?;
        if self.scan_timeout_secs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "scan_watcher.scan_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
