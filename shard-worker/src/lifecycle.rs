//! Worker lifecycle
//!
//! Processes exactly one shard and leaves the filesystem in one of two
//! terminal states:
//! - success: `output/<shard>.txt` written atomically, artifact removed
//! - failure: artifact renamed to `_failed`, one failure log line appended
//!
//! Processing and bookkeeping outcomes are reported separately so that a
//! failure to record a failure is visible without masking the original one.

use shard_core::{Config, FailureLog, FailureLogEntry, ShardIndex, ShardLayout};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info, warn};

use crate::error::ProcessingError;
use crate::records::{self, RecordCount};
use crate::source::ShardSource;

/// Primary outcome: did the shard get processed
#[derive(Debug)]
pub enum ProcessingOutcome {
    Succeeded(RecordCount),
    Failed(ProcessingError),
}

/// What happened to the shard's submission artifact
#[derive(Debug, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Deleted after success
    Removed,
    /// Renamed to the `_failed` variant after failure
    RetainedAsFailed,
    /// No artifact existed (worker launched by hand, or already handled)
    Missing,
    /// The filesystem operation itself failed
    Error(String),
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "removed"),
            Self::RetainedAsFailed => write!(f, "retained as failed"),
            Self::Missing => write!(f, "missing"),
            Self::Error(e) => write!(f, "error ({})", e),
        }
    }
}

/// Secondary outcome: recording the failure
#[derive(Debug, PartialEq, Eq)]
pub enum FailureLogOutcome {
    /// Processing succeeded; nothing to record
    NotNeeded,
    Appended,
    /// The append failed; reported locally and otherwise ignored
    Lost(String),
}

impl fmt::Display for FailureLogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNeeded => write!(f, "not needed"),
            Self::Appended => write!(f, "appended"),
            Self::Lost(e) => write!(f, "lost ({})", e),
        }
    }
}

/// Everything one worker invocation did
#[derive(Debug)]
pub struct WorkerReport {
    pub shard: ShardIndex,
    pub processing: ProcessingOutcome,
    pub artifact: ArtifactOutcome,
    pub failure_log: FailureLogOutcome,
}

impl WorkerReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.processing, ProcessingOutcome::Succeeded(_))
    }
}

/// Runs the per-shard lifecycle
pub struct ShardWorker {
    config: Config,
    layout: ShardLayout,
    failure_log: FailureLog,
}

impl ShardWorker {
    pub fn new(config: &Config) -> Self {
        let layout = ShardLayout::from_config(config);
        Self {
            config: config.clone(),
            failure_log: FailureLog::new(layout.error_log()),
            layout,
        }
    }

    /// Processes one shard and records its terminal state
    pub fn run(&self, shard: ShardIndex) -> WorkerReport {
        match self.process(shard) {
            Ok(count) => self.complete(shard, count),
            Err(e) => self.fail(shard, e),
        }
    }

    fn process(&self, shard: ShardIndex) -> Result<RecordCount, ProcessingError> {
        let source = ShardSource::parse(&self.config.source_location(shard));
        info!("Processing shard {} from {}", shard, source.describe());

        let mut stream = source.open()?;
        let count = records::count_records(&mut stream).map_err(|e| ProcessingError::Stream {
            location: stream.location().to_string(),
            source: e,
        })?;
        stream.finish()?;

        if count.skipped_members > 0 {
            warn!(
                "Shard {}: skipped {} malformed member(s)",
                shard, count.skipped_members
            );
        }
        info!("{}: {}", shard, count.records);

        self.write_result(shard, count.records)?;
        Ok(count)
    }

    /// Writes the result record via a staging file so it appears complete or not at all
    fn write_result(&self, shard: ShardIndex, records: u64) -> Result<(), ProcessingError> {
        let staging = self.layout.result_staging_path(shard);
        let target = self.layout.result_path(shard);
        let write_error = |source: io::Error| ProcessingError::WriteResult {
            path: target.display().to_string(),
            source,
        };

        fs::create_dir_all(self.layout.output_dir()).map_err(write_error)?;

        let written = fs::write(&staging, format!("{}: {}", shard, records))
            .and_then(|_| fs::rename(&staging, &target));

        if let Err(e) = written {
            if let Err(cleanup) = remove_if_present(&staging) {
                warn!(
                    "Failed to remove staging file {}: {}",
                    staging.display(),
                    cleanup
                );
            }
            return Err(write_error(e));
        }

        Ok(())
    }

    fn complete(&self, shard: ShardIndex, count: RecordCount) -> WorkerReport {
        let artifact = match remove_if_present(&self.layout.artifact_path(shard)) {
            Ok(true) => ArtifactOutcome::Removed,
            Ok(false) => ArtifactOutcome::Missing,
            Err(e) => {
                warn!("Failed to remove artifact for shard {}: {}", shard, e);
                ArtifactOutcome::Error(e.to_string())
            }
        };

        // A success supersedes an earlier failed attempt
        if let Err(e) = remove_if_present(&self.layout.failed_artifact_path(shard)) {
            warn!("Failed to remove stale failed artifact for shard {}: {}", shard, e);
        }

        info!("Shard {} succeeded with {} record(s)", shard, count.records);

        WorkerReport {
            shard,
            processing: ProcessingOutcome::Succeeded(count),
            artifact,
            failure_log: FailureLogOutcome::NotNeeded,
        }
    }

    fn fail(&self, shard: ShardIndex, failure: ProcessingError) -> WorkerReport {
        error!("Shard {} failed: {}", shard, failure);

        let artifact = match fs::rename(
            self.layout.artifact_path(shard),
            self.layout.failed_artifact_path(shard),
        ) {
            Ok(()) => ArtifactOutcome::RetainedAsFailed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No submission artifact to retain for shard {}", shard);
                ArtifactOutcome::Missing
            }
            Err(e) => {
                error!("Failed to retain artifact for shard {}: {}", shard, e);
                ArtifactOutcome::Error(e.to_string())
            }
        };

        // The latest outcome wins over a result from an earlier attempt
        if let Err(e) = remove_if_present(&self.layout.result_path(shard)) {
            warn!("Failed to remove stale result for shard {}: {}", shard, e);
        }

        let entry = FailureLogEntry::new(shard, failure.to_string());
        let failure_log = match self.failure_log.append(&entry) {
            Ok(()) => FailureLogOutcome::Appended,
            Err(e) => {
                error!(
                    "Could not write error log {}: {}",
                    self.failure_log.path().display(),
                    e
                );
                FailureLogOutcome::Lost(e.to_string())
            }
        };

        WorkerReport {
            shard,
            processing: ProcessingOutcome::Failed(failure),
            artifact,
            failure_log,
        }
    }
}

/// Loads configuration through `lookup` and runs one shard
///
/// A configuration that cannot be loaded fails the shard, bookkept under
/// whichever locations could still be read, so a submitted shard always
/// reaches a terminal state.
pub fn run_with_lookup<F>(shard: ShardIndex, lookup: F) -> WorkerReport
where
    F: Fn(&str) -> Option<String>,
{
    match Config::from_lookup(&lookup) {
        Ok(config) => ShardWorker::new(&config).run(shard),
        Err(e) => {
            let config = Config::locations_from_lookup(&lookup);
            ShardWorker::new(&config).fail(shard, ProcessingError::Config(e))
        }
    }
}

/// Removes a file, reporting whether it existed
fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
