//! Shared failure log
//!
//! Every failing worker appends exactly one line. Workers run as separate
//! processes without a lock, so each entry is written with a single
//! `write` on a file opened in append mode, and embedded newlines are
//! flattened to keep entries one line each.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::shard::ShardIndex;

const ENTRY_PREFIX: &str = "Shard number ";

/// One failed shard and the error that failed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLogEntry {
    pub shard: ShardIndex,
    pub detail: String,
}

impl FailureLogEntry {
    pub fn new(shard: ShardIndex, detail: impl Into<String>) -> Self {
        Self {
            shard,
            detail: detail.into(),
        }
    }

    /// Renders the entry as a single newline-terminated line
    pub fn to_line(&self) -> String {
        let detail: String = self
            .detail
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!("{}{}: {}\n", ENTRY_PREFIX, self.shard, detail.trim())
    }

    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(ENTRY_PREFIX)?;
        let (index, detail) = rest.split_once(':')?;
        let shard = index.parse().ok()?;
        Some(Self::new(shard, detail.trim()))
    }
}

/// A line read back from the failure log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureLogLine {
    Entry(FailureLogEntry),
    /// Text that is not a well-formed entry, e.g. from an older writer
    Unparsed(String),
}

/// Handle on the failure log file
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &FailureLogEntry) -> io::Result<()> {
        let line = entry.to_line();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Reads every line; a log that does not exist yet reads as empty
    pub fn read(&self) -> io::Result<Vec<FailureLogLine>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match FailureLogEntry::parse(line) {
                Some(entry) => FailureLogLine::Entry(entry),
                None => FailureLogLine::Unparsed(line.to_string()),
            })
            .collect())
    }
}
