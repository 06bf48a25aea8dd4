//! Work plans
//!
//! A plan is the ordered list of shards one dispatch run submits.
//! Order decides submission order only; completion order is up to the cluster.

use std::collections::HashSet;
use thiserror::Error;

use crate::shard::ShardIndex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Shard {0} appears more than once in the plan")]
    Duplicate(ShardIndex),

    #[error("Shard {shard} is outside the dataset (size {dataset_size})")]
    OutOfRange { shard: ShardIndex, dataset_size: u64 },

    #[error("Invalid shard range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },
}

/// Ordered, duplicate-free sequence of shards to dispatch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkPlan {
    shards: Vec<ShardIndex>,
}

impl WorkPlan {
    /// Builds a plan, rejecting any repeated index
    pub fn new<I>(shards: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = ShardIndex>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for shard in shards {
            if !seen.insert(shard) {
                return Err(PlanError::Duplicate(shard));
            }
            ordered.push(shard);
        }

        Ok(Self { shards: ordered })
    }

    /// Plan covering `start..end` in ascending order
    pub fn range(start: u64, end: u64) -> Result<Self, PlanError> {
        if start > end {
            return Err(PlanError::InvalidRange { start, end });
        }
        Ok(Self {
            shards: (start..end).map(ShardIndex::new).collect(),
        })
    }

    /// Checks that every shard exists in a dataset of `dataset_size` shards
    pub fn ensure_within(&self, dataset_size: u64) -> Result<(), PlanError> {
        match self.shards.iter().find(|s| s.get() >= dataset_size) {
            Some(&shard) => Err(PlanError::OutOfRange {
                shard,
                dataset_size,
            }),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shards(&self) -> &[ShardIndex] {
        &self.shards
    }

    pub fn iter(&self) -> impl Iterator<Item = ShardIndex> + '_ {
        self.shards.iter().copied()
    }
}
