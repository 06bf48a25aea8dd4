//! Shard Worker
//!
//! Runs inside one SLURM job and processes exactly one dataset shard.
//!
//! Architecture:
//! - Source: opens the shard archive (local file or piped command)
//! - Records: lenient, streaming record decoding and counting
//! - Lifecycle: writes the result record on success, or retains the
//!   artifact and appends to the failure log on failure
//!
//! The worker never talks to the dispatcher; its only output is the
//! filesystem state it leaves behind and its exit code.

mod error;
mod identity;
mod lifecycle;
mod records;
mod source;

use clap::Parser;
use shard_core::ShardIndex;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::identity::ExecutionIdentity;
use crate::lifecycle::ProcessingOutcome;

#[derive(Parser)]
#[command(name = "shard-worker")]
#[command(about = "Process one dataset shard", long_about = None)]
struct Args {
    /// Index of the shard to process
    shard: u64,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_worker=info,shard_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let identity = ExecutionIdentity::from_env();
    info!("{}", identity);

    let shard = ShardIndex::new(args.shard);
    let report = lifecycle::run_with_lookup(shard, |var| std::env::var(var).ok());

    match &report.processing {
        ProcessingOutcome::Succeeded(count) => info!(
            "Shard {} succeeded: {} record(s), {} skipped member(s), artifact {}",
            report.shard, count.records, count.skipped_members, report.artifact
        ),
        ProcessingOutcome::Failed(e) => error!(
            "Shard {} failed: {}; artifact {}, failure log {}",
            report.shard, e, report.artifact, report.failure_log
        ),
    }

    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
