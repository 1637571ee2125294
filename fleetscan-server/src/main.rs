use clap::Parser;

use fleetscan_server::cli::{Cli, Command, RunArgs};
use fleetscan_server::{asset_create, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::AssetCreate(args)) => asset_create::run(args).await,
        Some(Command::Run(args)) => run::run(args).await,
        None => run::run(RunArgs::default()).await,
    }
}
