//! Shard identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Zero-padding width used wherever an index appears in a file name or record
pub const SHARD_INDEX_WIDTH: usize = 6;

/// Index of one independently dispatchable shard of the dataset
///
/// Displays zero-padded so that file names sort in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardIndex(u64);

impl ShardIndex {
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = SHARD_INDEX_WIDTH)
    }
}

impl FromStr for ShardIndex {
    type Err = std::num::ParseIntError;

    /// Accepts both padded (`000042`) and plain (`42`) forms
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}
