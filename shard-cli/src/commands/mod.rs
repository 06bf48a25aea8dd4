//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod config;
mod dispatch;
mod failures;
mod status;

pub use dispatch::DispatchArgs;
pub use failures::FailuresArgs;
pub use status::StatusArgs;

use anyhow::Result;
use clap::Subcommand;
use shard_core::{Config, PlanError, ShardIndex};

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit shards to the cluster under admission control
    Dispatch(DispatchArgs),
    /// Summarize shard status from the cache and output directories
    Status(StatusArgs),
    /// Show the shared failure log
    Failures(FailuresArgs),
    /// Print the effective configuration
    Config,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Dispatch(args) => dispatch::handle_dispatch_command(args, config).await,
        Commands::Status(args) => status::handle_status_command(args, &config),
        Commands::Failures(args) => failures::handle_failures_command(args, &config),
        Commands::Config => config::handle_config_command(&config),
    }
}

/// Resolves an optional `start..end` window against the dataset size
///
/// `end` is capped at the dataset size; a `start` outside the dataset is
/// rejected. An inverted window is left for `WorkPlan::range` to reject.
pub(crate) fn shard_window(
    start: Option<u64>,
    end: Option<u64>,
    dataset_size: u64,
) -> Result<(u64, u64), PlanError> {
    let start = start.unwrap_or(0);
    if start >= dataset_size {
        return Err(PlanError::OutOfRange {
            shard: ShardIndex::new(start),
            dataset_size,
        });
    }
    let end = end.unwrap_or(dataset_size).min(dataset_size);
    Ok((start, end))
}
