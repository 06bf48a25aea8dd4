//! Failures command handler

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use shard_core::{Config, FailureLog, FailureLogLine};

#[derive(Args, Debug)]
pub struct FailuresArgs {
    /// Only show entries for this shard
    #[arg(long)]
    shard: Option<u64>,
}

/// Handle the failures command
pub fn handle_failures_command(args: FailuresArgs, config: &Config) -> Result<()> {
    let log = FailureLog::new(&config.error_log);
    let lines = log
        .read()
        .with_context(|| format!("Failed to read failure log {}", log.path().display()))?;

    let lines = filter_lines(lines, args.shard);

    if lines.is_empty() {
        println!("{}", "No failures recorded.".green());
        return Ok(());
    }

    println!("{}", format!("Failures ({}):", lines.len()).bold());
    println!("{}", "─".repeat(80).dimmed());
    for line in &lines {
        match line {
            FailureLogLine::Entry(entry) => {
                println!("{} {}", entry.shard.to_string().red(), entry.detail)
            }
            FailureLogLine::Unparsed(raw) => println!("{}", raw.dimmed()),
        }
    }

    Ok(())
}

/// Keeps entries for `shard`; unparsed lines only survive an unfiltered view
fn filter_lines(lines: Vec<FailureLogLine>, shard: Option<u64>) -> Vec<FailureLogLine> {
    match shard {
        None => lines,
        Some(wanted) => lines
            .into_iter()
            .filter(|line| {
                matches!(line, FailureLogLine::Entry(entry) if entry.shard.get() == wanted)
            })
            .collect(),
    }
}
