//! Config command handler

use anyhow::Result;
use colored::*;
use shard_core::{Config, ShardIndex, ShardLayout};

/// Handle the config command
///
/// Prints the configuration as resolved from the environment, then any
/// validation problem, so a run can be checked before dispatching.
pub fn handle_config_command(config: &Config) -> Result<()> {
    let layout = ShardLayout::from_config(config);
    let resources = &config.resources;

    println!("{}", "Effective configuration".bold());
    println!("{}", "─".repeat(80).dimmed());

    let rows = [
        ("cache dir", layout.cache_dir().display().to_string()),
        ("log dir", layout.log_dir().display().to_string()),
        ("output dir", layout.output_dir().display().to_string()),
        ("error log", layout.error_log().display().to_string()),
        (
            "scheduler logs",
            layout.scheduler_log_pattern().display().to_string(),
        ),
        ("job name", config.job_name.clone()),
        ("job comment", config.job_comment.clone()),
        (
            "resources",
            format!(
                "{} node(s), {} gpu(s), {} cpu(s)/gpu, {} task(s)/node",
                resources.nodes,
                resources.gpus,
                resources.cpus_per_gpu,
                resources.tasks_per_node
            ),
        ),
        ("max concurrent", config.max_concurrent.to_string()),
        (
            "poll interval",
            format!("{}ms", config.poll_interval.as_millis()),
        ),
        ("on query error", config.on_query_error.to_string()),
        ("max query failures", config.max_query_failures.to_string()),
        ("dataset size", config.dataset_size.to_string()),
        ("source template", config.source_template.clone()),
        (
            "first source",
            config.source_location(ShardIndex::new(0)),
        ),
        ("worker command", config.worker_command.clone()),
        ("submit command", config.submit_command.clone()),
        ("queue command", config.queue_command.clone()),
    ];

    for (name, value) in rows {
        println!("{:<20} {}", format!("{}:", name).cyan(), value);
    }

    println!();
    match config.validate() {
        Ok(()) => println!("{}", "Configuration is valid.".green()),
        Err(e) => println!("{} {}", "Configuration is invalid:".red().bold(), e),
    }

    Ok(())
}
