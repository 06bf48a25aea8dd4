//! Scheduler layer for the dispatcher
//!
//! This layer walks a work plan and submits one job per shard, gating
//! every submission on the number of jobs already in the queue.

pub mod dispatcher;

pub use dispatcher::{DispatchSummary, Dispatcher, RejectedShard, SubmittedShard};
