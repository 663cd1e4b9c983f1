mod analysis;
mod auth;
mod cli;
mod enrich;
mod error;
mod ingest;
mod metrics;
mod models;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting DeployMind - DevOps Health Scoring");
    cli.execute().await?;

    Ok(())
}
