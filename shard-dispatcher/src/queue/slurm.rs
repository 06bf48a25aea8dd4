//! SLURM queue
//!
//! Wraps the `sbatch` and `squeue` command-line tools:
//! - `sbatch <script>` prints `Submitted batch job <id>` on acceptance
//! - `squeue -n <name>` prints one header line followed by one line per job

use async_trait::async_trait;
use shard_core::Config;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error};

use super::{ClusterQueue, JobId};
use crate::error::QueueError;

/// Keyword `sbatch` prints on the line announcing an accepted job
const ACCEPTED_MARKER: &str = "Submitted";

/// Position of the job id on the accepted line (`Submitted batch job <id>`)
const JOB_ID_FIELD: usize = 3;

/// Header lines `squeue` always prints before the job list
const QUEUE_HEADER_LINES: usize = 1;

/// Cluster queue backed by the SLURM command-line tools
#[derive(Debug, Clone)]
pub struct SlurmQueue {
    submit_command: String,
    queue_command: String,
}

impl SlurmQueue {
    pub fn new(submit_command: impl Into<String>, queue_command: impl Into<String>) -> Self {
        Self {
            submit_command: submit_command.into(),
            queue_command: queue_command.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.submit_command.clone(), config.queue_command.clone())
    }
}

#[async_trait]
impl ClusterQueue for SlurmQueue {
    async fn submit(&self, artifact: &Path) -> Result<JobId, QueueError> {
        let submission_error = |reason: String| QueueError::Submission {
            artifact: artifact.display().to_string(),
            reason,
        };

        let output = Command::new(&self.submit_command)
            .arg(artifact)
            .output()
            .await
            .map_err(|e| {
                submission_error(format!("failed to execute '{}': {}", self.submit_command, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", self.submit_command, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", self.submit_command, stderr.trim());
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let reason = format!(
                "exit_code={}, stdout='{}', stderr='{}'",
                exit_code,
                stdout.trim(),
                stderr.trim()
            );
            error!("{} rejected {}: {}", self.submit_command, artifact.display(), reason);
            return Err(submission_error(reason));
        }

        parse_submission(&stdout).map_err(submission_error)
    }

    async fn count_running(&self, job_name: &str) -> Result<usize, QueueError> {
        let query_error = |reason: String| QueueError::Query {
            job_name: job_name.to_string(),
            reason,
        };

        let output = Command::new(&self.queue_command)
            .arg("-n")
            .arg(job_name)
            .output()
            .await
            .map_err(|e| {
                query_error(format!("failed to execute '{}': {}", self.queue_command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(query_error(format!(
                "exit_code={}, stderr='{}'",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_running_count(&stdout))
    }
}

/// Extracts the job id from `sbatch` output
///
/// Fails unless a line carries the acceptance marker and a numeric id in
/// the expected position, rather than guessing at a different token.
pub fn parse_submission(stdout: &str) -> Result<JobId, String> {
    let line = stdout
        .lines()
        .find(|line| line.contains(ACCEPTED_MARKER))
        .ok_or_else(|| {
            format!(
                "no '{}' line in scheduler output: '{}'",
                ACCEPTED_MARKER,
                stdout.trim()
            )
        })?;

    let token = line
        .split_whitespace()
        .nth(JOB_ID_FIELD)
        .ok_or_else(|| format!("no job id on acceptance line: '{}'", line.trim()))?;

    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "unexpected job id '{}' on acceptance line: '{}'",
            token,
            line.trim()
        ));
    }

    Ok(JobId::new(token))
}

/// Counts job lines in `squeue` output, excluding the header
pub fn parse_running_count(stdout: &str) -> usize {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
        .saturating_sub(QUEUE_HEADER_LINES)
}
