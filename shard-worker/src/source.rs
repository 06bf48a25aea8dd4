//! Shard sources
//!
//! A rendered source location is either:
//! - `pipe:<command>`: run through `sh -c`, the archive is read from its stdout
//! - `file://<path>` or a plain path: read from the local filesystem

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

use crate::error::ProcessingError;

const PIPE_PREFIX: &str = "pipe:";
const FILE_PREFIX: &str = "file://";

/// Where a shard's archive bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardSource {
    Pipe(String),
    File(PathBuf),
}

impl ShardSource {
    pub fn parse(location: &str) -> Self {
        if let Some(command) = location.strip_prefix(PIPE_PREFIX) {
            Self::Pipe(command.trim().to_string())
        } else if let Some(path) = location.strip_prefix(FILE_PREFIX) {
            Self::File(PathBuf::from(path))
        } else {
            Self::File(PathBuf::from(location))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Pipe(command) => format!("{}{}", PIPE_PREFIX, command),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Opens the source for streaming
    pub fn open(&self) -> Result<SourceStream, ProcessingError> {
        let location = self.describe();
        let open_error = |source: io::Error| ProcessingError::Open {
            location: location.clone(),
            source,
        };

        match self {
            Self::File(path) => {
                let file = File::open(path).map_err(open_error)?;
                Ok(SourceStream {
                    location,
                    reader: Box::new(file),
                    child: None,
                })
            }
            Self::Pipe(command) => {
                debug!("Spawning source command: {}", command);
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(open_error)?;

                let stdout = child.stdout.take().ok_or_else(|| {
                    open_error(io::Error::other("source command has no stdout"))
                })?;

                Ok(SourceStream {
                    location,
                    reader: Box::new(stdout),
                    child: Some(child),
                })
            }
        }
    }
}

/// Byte stream of one shard archive
pub struct SourceStream {
    location: String,
    reader: Box<dyn Read>,
    child: Option<Child>,
}

impl SourceStream {
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Drains unread bytes and checks the source command's exit status
    pub fn finish(mut self) -> Result<(), ProcessingError> {
        io::copy(&mut self.reader, &mut io::sink()).map_err(|source| ProcessingError::Stream {
            location: self.location.clone(),
            source,
        })?;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().map_err(|source| ProcessingError::Stream {
            location: self.location.clone(),
            source,
        })?;

        if !status.success() {
            return Err(ProcessingError::SourceExit {
                location: self.location.clone(),
                status,
            });
        }

        Ok(())
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for SourceStream {
    fn drop(&mut self) {
        // Abandoned mid-stream: don't leave the command running
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Source command already exited: {}", e);
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap source command for {}: {}", self.location, e);
            }
        }
    }
}
