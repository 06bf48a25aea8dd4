//! Cluster queue layer
//!
//! The queue is the only component allowed to invoke the external
//! scheduler. It is trait-based so the dispatch loop can be driven by a
//! scripted queue in tests.

mod slurm;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::error::QueueError;

pub use slurm::{SlurmQueue, parse_running_count, parse_submission};

/// Identifier the scheduler assigned to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submit and query operations of an external batch scheduler
#[async_trait]
pub trait ClusterQueue: Send + Sync {
    /// Submits the job described by `artifact`
    ///
    /// # Returns
    /// The scheduler's identifier for the new job
    async fn submit(&self, artifact: &Path) -> Result<JobId, QueueError>;

    /// Counts queued and running jobs named `job_name`
    async fn count_running(&self, job_name: &str) -> Result<usize, QueueError>;
}
