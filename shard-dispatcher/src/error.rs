//! Error types for the dispatcher

use shard_core::ShardIndex;
use thiserror::Error;

/// Errors reported by a cluster queue
#[derive(Debug, Error)]
pub enum QueueError {
    /// The scheduler rejected the job or its output could not be understood
    #[error("Submission of {artifact} failed: {reason}")]
    Submission { artifact: String, reason: String },

    /// The running-job query failed
    #[error("Queue query for job '{job_name}' failed: {reason}")]
    Query { job_name: String, reason: String },
}

/// Errors that can occur while dispatching a plan
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Cache, log or output directory could not be created
    #[error("Failed to prepare run directories: {0}")]
    Prepare(#[source] std::io::Error),

    /// Submission artifact could not be written
    #[error("Failed to write submission artifact for shard {shard}: {source}")]
    Artifact {
        shard: ShardIndex,
        #[source]
        source: std::io::Error,
    },

    /// Scheduler call failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Queue query kept failing under the assume-full policy
    #[error("Queue query failed {failures} consecutive times, giving up: {last}")]
    QueryExhausted {
        failures: u32,
        #[source]
        last: QueueError,
    },
}
