//! Dispatch command handler
//!
//! Builds a work plan from the command line (range, explicit list, or
//! status filter for replaying failures) and runs it through the
//! admission-controlled dispatcher.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use shard_core::{
    Config, QueryErrorPolicy, ShardIndex, ShardLayout, ShardStatus, StatusSnapshot, WorkPlan,
};
use shard_dispatcher::{DispatchSummary, Dispatcher, SlurmQueue};
use std::time::Duration;
use tracing::info;

use super::shard_window;

/// Plan selection and admission overrides
#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// First shard to dispatch (inclusive)
    #[arg(long, conflicts_with = "shards")]
    start: Option<u64>,

    /// Shard to stop before (exclusive); defaults to the dataset size
    #[arg(long, conflicts_with = "shards")]
    end: Option<u64>,

    /// Comma-separated shard indices, dispatched in the given order
    #[arg(long, value_delimiter = ',')]
    shards: Vec<u64>,

    /// Only dispatch shards currently in these states, e.g. `failed,pending`
    #[arg(long, value_delimiter = ',')]
    only: Vec<ShardStatus>,

    /// Override the concurrency ceiling
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Override the admission poll interval, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Override the queue query error policy (`abort` or `assume-full`)
    #[arg(long)]
    on_query_error: Option<QueryErrorPolicy>,

    /// Print the plan without submitting anything
    #[arg(long)]
    dry_run: bool,
}

/// Handle the dispatch command
pub async fn handle_dispatch_command(args: DispatchArgs, mut config: Config) -> Result<()> {
    apply_overrides(&args, &mut config);
    config.validate().context("Invalid configuration")?;

    let plan = build_plan(&args, &config)?;

    if plan.is_empty() {
        println!("{}", "No shards to dispatch.".yellow());
        return Ok(());
    }

    if args.dry_run {
        println!(
            "{}",
            format!("Would dispatch {} shard(s):", plan.len()).bold()
        );
        print_plan(&plan);
        return Ok(());
    }

    info!(
        "Dispatching {} shard(s), first {}, last {}",
        plan.len(),
        plan.shards()[0],
        plan.shards()[plan.len() - 1]
    );

    let dispatcher = Dispatcher::new(&config, SlurmQueue::from_config(&config));
    let summary = dispatcher.run(&plan).await.context("Dispatch aborted")?;

    print_summary(&summary);
    Ok(())
}

fn apply_overrides(args: &DispatchArgs, config: &mut Config) {
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(policy) = args.on_query_error {
        config.on_query_error = policy;
    }
}

/// Resolves the command line into a validated work plan
fn build_plan(args: &DispatchArgs, config: &Config) -> Result<WorkPlan> {
    let candidates = if args.shards.is_empty() {
        let (start, end) = shard_window(args.start, args.end, config.dataset_size)
            .context("Invalid shard window")?;
        WorkPlan::range(start, end).context("Invalid shard window")?
    } else {
        WorkPlan::new(args.shards.iter().copied().map(ShardIndex::new))
            .context("Invalid work plan")?
    };
    candidates
        .ensure_within(config.dataset_size)
        .context("Invalid work plan")?;

    if args.only.is_empty() {
        return Ok(candidates);
    }

    let snapshot = StatusSnapshot::scan(&ShardLayout::from_config(config))
        .context("Failed to inspect shard status")?;
    let selected = snapshot.select(candidates.iter(), &args.only);

    WorkPlan::new(selected).context("Invalid work plan")
}

fn print_plan(plan: &WorkPlan) {
    const PREVIEW: usize = 20;

    for shard in plan.iter().take(PREVIEW) {
        println!("  {}", shard);
    }
    if plan.len() > PREVIEW {
        println!(
            "{}",
            format!("  ... and {} more", plan.len() - PREVIEW).dimmed()
        );
    }
}

fn print_summary(summary: &DispatchSummary) {
    println!();
    println!(
        "{}: {} attempted, {} submitted, {} rejected",
        "Dispatch complete".bold(),
        summary.attempted(),
        summary.submitted.len().to_string().green(),
        if summary.rejected.is_empty() {
            "0".normal()
        } else {
            summary.rejected.len().to_string().red()
        }
    );
    println!(
        "{}",
        format!("Waited for queue headroom {} time(s)", summary.admission_waits).dimmed()
    );

    if !summary.rejected.is_empty() {
        println!();
        println!("{}", "Rejected shards:".red().bold());
        for rejected in &summary.rejected {
            println!("  {} {}", rejected.shard.to_string().red(), rejected.reason);
        }
        println!(
            "{}",
            "Rejected shards remain pending; rerun with --only pending to retry.".dimmed()
        );
    }
}
