use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "fleetscan", version)]
#[command(about = "Reconciliation control plane for fleet-wide security scans")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scan orchestrator until interrupted
    Run(RunArgs),
    /// Create an asset from a JSON description of its asset info
    AssetCreate(AssetCreateArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to a TOML or JSON config file (overrides FLEETSCAN_CONFIG_PATH)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// State API address, for example http://localhost:8888/api
    #[arg(long)]
    pub backend_address: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AssetCreateArgs {
    /// Asset info JSON file; must carry an `objectType`
    #[arg(long)]
    pub file: PathBuf,

    /// State API address, for example http://localhost:8888/api
    #[arg(long, env = "FLEETSCAN_BACKEND_ADDRESS")]
    pub backend_address: String,

    /// Update the existing asset instead of failing when it already exists
    #[arg(long, default_value_t = false)]
    pub update_if_exists: bool,
}
