//! Worker error types

use shard_core::ConfigError;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Unrecoverable failure while processing one shard
///
/// Recorded through the failure log and the `_failed` artifact; never
/// reported back to the dispatcher.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ConfigError),

    #[error("Failed to open shard source '{location}': {source}")]
    Open {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("Shard stream from '{location}' is unreadable: {source}")]
    Stream {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("Shard source '{location}' exited with {status}")]
    SourceExit {
        location: String,
        status: ExitStatus,
    },

    #[error("Failed to write result record {path}: {source}")]
    WriteResult {
        path: String,
        #[source]
        source: io::Error,
    },
}
