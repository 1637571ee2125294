use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use fleetscan_config::{ConfigLoad, ConfigLoader};
use fleetscan_core::Orchestrator;
use fleetscan_core::backend::{HttpBackend, StateBackend};
use fleetscan_core::findings::ResultFindingsConverter;

use crate::cli::RunArgs;
use crate::telemetry;

/// `fleetscan run`: starts every controller and blocks until Ctrl-C or
/// SIGTERM, then shuts them down.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(address) = args.backend_address {
        config.backend.address = address;
        config.validate().context("invalid --backend-address")?;
    }

    telemetry::init_tracing(&config.log.filter);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    for warning in &warnings {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let backend: Arc<dyn StateBackend> = Arc::new(
        HttpBackend::new(&config.backend.address).context("failed to create state API client")?,
    );
    let converter = Arc::new(ResultFindingsConverter::new(Arc::clone(&backend)));
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), backend, converter)
        .context("invalid orchestrator configuration")?;

    info!(
        backend = %config.backend.address,
        source = ?config.metadata.source,
        "starting fleetscan orchestrator"
    );
    orchestrator
        .start()
        .await
        .context("failed to start orchestrator")?;

    shutdown_signal().await;
    orchestrator.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
