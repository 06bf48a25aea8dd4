//! Shard Core
//!
//! Core types shared by the dispatcher, the worker and the CLI.
//!
//! This crate contains:
//! - Configuration: the static cluster/dataset settings read once at start
//! - Layout: the pure mapping from shard index to artifact and result paths
//! - Plan: ordered, duplicate-free sets of shards to dispatch
//! - Status: shard state derived from filesystem inspection
//! - Failure log: the append-only record written by failing workers

pub mod config;
pub mod failure_log;
pub mod layout;
pub mod plan;
pub mod shard;
pub mod status;

pub use config::{Config, ConfigError, QueryErrorPolicy, ResourceShape};
pub use failure_log::{FailureLog, FailureLogEntry, FailureLogLine};
pub use layout::{ArtifactKind, ShardLayout};
pub use plan::{PlanError, WorkPlan};
pub use shard::{SHARD_INDEX_WIDTH, ShardIndex};
pub use status::{ShardStatus, StatusSnapshot, StatusSummary};
