//! Shard Dispatcher
//!
//! Pushes a work plan of dataset shards onto a SLURM cluster without
//! exceeding a fixed number of queued jobs.
//!
//! Architecture:
//! - Builder: renders one sbatch script per shard into the cache directory
//! - Queue: the only code that talks to the scheduler (`sbatch`, `squeue`)
//! - Scheduler: the admission-controlled dispatch loop
//!
//! The dispatcher never waits for jobs to finish. Workers report through
//! the filesystem; see `shard_core::status` for reading their outcome back.

pub mod builder;
pub mod error;
pub mod queue;
pub mod scheduler;

pub use builder::ArtifactBuilder;
pub use error::{DispatchError, QueueError};
pub use queue::{ClusterQueue, JobId, SlurmQueue};
pub use scheduler::{DispatchSummary, Dispatcher, RejectedShard, SubmittedShard};
