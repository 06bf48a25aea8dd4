//! Shard status derived from the filesystem
//!
//! The file contract is the only state shared between dispatcher and
//! workers. This module turns it back into an explicit per-shard status:
//!
//! | result record | active artifact | failed artifact | status    |
//! |---------------|-----------------|-----------------|-----------|
//! | yes           | any             | any             | Succeeded |
//! | no            | yes             | any             | Submitted |
//! | no            | no              | yes             | Failed    |
//! | no            | no              | no              | Pending   |
//!
//! A resubmitted failure therefore reads as Submitted until its worker
//! reports again.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::layout::{ArtifactKind, ShardLayout};
use crate::shard::ShardIndex;

/// Lifecycle state of one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Pending,
    Submitted,
    Succeeded,
    Failed,
}

impl ShardStatus {
    pub const ALL: [ShardStatus; 4] = [
        ShardStatus::Pending,
        ShardStatus::Submitted,
        ShardStatus::Succeeded,
        ShardStatus::Failed,
    ];

    /// Status implied by which of a shard's files exist
    pub fn from_files(has_result: bool, has_artifact: bool, has_failed_artifact: bool) -> Self {
        if has_result {
            ShardStatus::Succeeded
        } else if has_artifact {
            ShardStatus::Submitted
        } else if has_failed_artifact {
            ShardStatus::Failed
        } else {
            ShardStatus::Pending
        }
    }
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShardStatus::Pending => "pending",
            ShardStatus::Submitted => "submitted",
            ShardStatus::Succeeded => "succeeded",
            ShardStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl FromStr for ShardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ShardStatus::Pending),
            "submitted" => Ok(ShardStatus::Submitted),
            "succeeded" | "success" => Ok(ShardStatus::Succeeded),
            "failed" | "failure" => Ok(ShardStatus::Failed),
            other => Err(format!("unknown shard status '{}'", other)),
        }
    }
}

/// Per-status counts over a range of shards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: u64,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl StatusSummary {
    pub fn record(&mut self, status: ShardStatus) {
        match status {
            ShardStatus::Pending => self.pending += 1,
            ShardStatus::Submitted => self.submitted += 1,
            ShardStatus::Succeeded => self.succeeded += 1,
            ShardStatus::Failed => self.failed += 1,
        }
    }

    pub fn count(&self, status: ShardStatus) -> u64 {
        match status {
            ShardStatus::Pending => self.pending,
            ShardStatus::Submitted => self.submitted,
            ShardStatus::Succeeded => self.succeeded,
            ShardStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.submitted + self.succeeded + self.failed
    }
}

/// Point-in-time view of the cache and output directories
///
/// Built from one listing of each directory, which keeps status queries
/// over hundreds of thousands of shards cheap.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    results: HashSet<ShardIndex>,
    active: HashSet<ShardIndex>,
    failed: HashSet<ShardIndex>,
}

impl StatusSnapshot {
    /// Scans the layout's directories; missing directories count as empty
    pub fn scan(layout: &ShardLayout) -> io::Result<Self> {
        let mut snapshot = Self::default();

        for name in list_names(layout.cache_dir())? {
            match ShardLayout::parse_artifact_name(&name) {
                Some((shard, ArtifactKind::Active)) => {
                    snapshot.active.insert(shard);
                }
                Some((shard, ArtifactKind::Failed)) => {
                    snapshot.failed.insert(shard);
                }
                None => debug!("Ignoring unrelated cache entry {}", name),
            }
        }

        for name in list_names(layout.output_dir())? {
            if let Some(shard) = ShardLayout::parse_result_name(&name) {
                snapshot.results.insert(shard);
            }
        }

        Ok(snapshot)
    }

    pub fn status_of(&self, shard: ShardIndex) -> ShardStatus {
        ShardStatus::from_files(
            self.results.contains(&shard),
            self.active.contains(&shard),
            self.failed.contains(&shard),
        )
    }

    pub fn summarize<I>(&self, shards: I) -> StatusSummary
    where
        I: IntoIterator<Item = ShardIndex>,
    {
        let mut summary = StatusSummary::default();
        for shard in shards {
            summary.record(self.status_of(shard));
        }
        summary
    }

    /// Shards from `shards`, in order, whose status is one of `wanted`
    pub fn select<I>(&self, shards: I, wanted: &[ShardStatus]) -> Vec<ShardIndex>
    where
        I: IntoIterator<Item = ShardIndex>,
    {
        shards
            .into_iter()
            .filter(|shard| wanted.contains(&self.status_of(*shard)))
            .collect()
    }
}

fn list_names(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
