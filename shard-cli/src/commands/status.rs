//! Status command handler

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use serde::Serialize;
use shard_core::{
    Config, ShardIndex, ShardLayout, ShardStatus, StatusSnapshot, StatusSummary, WorkPlan,
};

use super::shard_window;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// First shard to inspect (inclusive)
    #[arg(long)]
    start: Option<u64>,

    /// Shard to stop before (exclusive); defaults to the dataset size
    #[arg(long)]
    end: Option<u64>,

    /// Also list every shard in this state
    #[arg(long)]
    list: Option<ShardStatus>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    start: u64,
    end: u64,
    summary: StatusSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    listed: Option<Vec<ShardIndex>>,
}

/// Handle the status command
pub fn handle_status_command(args: StatusArgs, config: &Config) -> Result<()> {
    let report = build_report(&args, config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Shards {}..{} ({} total)",
            report.start,
            report.end,
            report.summary.total()
        )
        .bold()
    );
    println!("{}", "─".repeat(40).dimmed());
    for status in ShardStatus::ALL {
        println!(
            "{:<12} {}",
            format!("{}:", status),
            colorize(status, &report.summary.count(status).to_string())
        );
    }

    if let (Some(status), Some(listed)) = (args.list, &report.listed) {
        println!();
        if listed.is_empty() {
            println!("{}", format!("No {} shards.", status).yellow());
        } else {
            println!("{}", format!("{} shards:", status).bold());
            for shard in listed {
                println!("  {}", colorize(status, &shard.to_string()));
            }
        }
    }

    Ok(())
}

fn build_report(args: &StatusArgs, config: &Config) -> Result<StatusReport> {
    let (start, end) = shard_window(args.start, args.end, config.dataset_size)
        .context("Invalid shard window")?;
    let plan = WorkPlan::range(start, end).context("Invalid shard window")?;
    let snapshot = StatusSnapshot::scan(&ShardLayout::from_config(config))
        .context("Failed to inspect shard status")?;

    let summary = snapshot.summarize(plan.iter());
    let listed = args.list.map(|status| snapshot.select(plan.iter(), &[status]));

    Ok(StatusReport {
        start,
        end,
        summary,
        listed,
    })
}

fn colorize(status: ShardStatus, text: &str) -> ColoredString {
    match status {
        ShardStatus::Succeeded => text.green(),
        ShardStatus::Submitted => text.cyan(),
        ShardStatus::Failed => text.red(),
        ShardStatus::Pending => text.normal(),
    }
}
