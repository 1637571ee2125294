use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::StateBackend;
use crate::controllers::{AssetScanProcessor, ScanConfigWatcher, ScanWatcher};
use crate::error::{OrchestratorError, Result};
use crate::findings::FindingsConverter;
use crate::orchestration::{ControllerHandle, OrchestratorConfig};

/// Runs every controller under one shutdown token.
pub struct Orchestrator {
    config: OrchestratorConfig,
    asset_scan_processor: Arc<AssetScanProcessor>,
    scan_watcher: Arc<ScanWatcher>,
    scan_config_watcher: Arc<ScanConfigWatcher>,
    shutdown_token: CancellationToken,
    handles: Mutex<Vec<ControllerHandle>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn StateBackend>,
        converter: Arc<dyn FindingsConverter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            asset_scan_processor: Arc::new(AssetScanProcessor::new(
                Arc::clone(&backend),
                converter,
                config.asset_scan_processor,
            )),
            scan_watcher: Arc::new(ScanWatcher::new(Arc::clone(&backend), config.scan_watcher)),
            scan_config_watcher: Arc::new(ScanConfigWatcher::new(
                backend,
                config.scan_config_watcher,
            )),
            config,
            shutdown_token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Token cancelled by [`Orchestrator::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Launches all controllers. Returns once their loops are spawned.
    pub async fn start(&self) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(OrchestratorError::Cancelled(
                "orchestrator has been shut down".to_string(),
            ));
        }

        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(OrchestratorError::Internal(
                "orchestrator already started".to_string(),
            ));
        }
        handles.push(self.asset_scan_processor.start(self.shutdown_token.clone()));
        handles.push(self.scan_watcher.start(self.shutdown_token.clone()));
        handles.push(self.scan_config_watcher.start(self.shutdown_token.clone()));

        tracing::info!(controllers = handles.len(), "orchestrator started");
        Ok(())
    }

    /// Cancels every loop and waits for them, bounded by `shutdown_grace_ms`
    /// per task.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown of orchestrator");
        self.shutdown_token.cancel();

        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        let grace = self.config.shutdown_grace();
        for handle in handles {
            let name = handle.name();
            handle.join(grace).await;
            tracing::debug!(controller = name, "controller stopped");
        }

        tracing::info!("Orchestrator shutdown complete");
        Ok(())
    }
}
