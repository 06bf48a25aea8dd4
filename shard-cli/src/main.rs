//! Shard CLI
//!
//! Command-line interface for dispatching dataset shards to SLURM and
//! inspecting their progress.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use shard_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardctl")]
#[command(about = "Dispatch and track dataset shards on a SLURM cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardctl=info,shard_dispatcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;

    handle_command(cli.command, config).await
}
