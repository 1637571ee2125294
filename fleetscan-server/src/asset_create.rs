use std::fs;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use fleetscan_core::backend::{HttpBackend, StateBackend};
use fleetscan_core::error::OrchestratorError;
use fleetscan_core::merge_patch;
use fleetscan_core::models::{Asset, AssetId};

use crate::cli::AssetCreateArgs;
use crate::telemetry;

/// Creates an asset seen at `now`.
///
/// When the store already holds a matching asset and `update_if_exists` is
/// set, that asset's `assetInfo` and `lastSeen` are patched in place and its
/// original `firstSeen` is kept.
pub async fn create_asset(
    backend: &dyn StateBackend,
    asset_info: Value,
    update_if_exists: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<Asset> {
    let asset = Asset {
        asset_info: Some(asset_info),
        first_seen: Some(now),
        last_seen: Some(now),
        ..Asset::default()
    };
    if asset.object_type().is_none() {
        bail!("asset info must carry an objectType");
    }

    let conflicting_id = match backend.create_asset(&asset).await {
        Ok(created) => return Ok(created),
        Err(OrchestratorError::Conflict { id, .. }) if update_if_exists && !id.is_empty() => {
            AssetId::from(id)
        }
        Err(err) => return Err(anyhow::Error::new(err).context("failed to post asset")),
    };

    let patch = merge_patch::to_patch(&Asset {
        first_seen: None,
        ..asset
    })?;
    backend
        .patch_asset(&conflicting_id, &patch)
        .await
        .context("failed to patch asset")?;
    info!(asset_id = %conflicting_id, "updated existing asset");

    backend
        .get_asset(&conflicting_id)
        .await
        .context("failed to fetch updated asset")
}

/// `fleetscan asset-create`: reads the asset info file, creates the asset and
/// prints it as JSON on stdout.
pub async fn run(args: AssetCreateArgs) -> anyhow::Result<()> {
    telemetry::init_tracing("warn");

    let backend =
        HttpBackend::new(&args.backend_address).context("failed to create state API client")?;
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read asset file {}", args.file.display()))?;
    let asset_info: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse asset file {}", args.file.display()))?;

    let asset = create_asset(&backend, asset_info, args.update_if_exists, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&asset)?);
    Ok(())
}
