//! Execution identity supplied by SLURM
//!
//! Only used for diagnostics; a missing or malformed rank never fails a shard.

use std::fmt;

const GLOBAL_RANK_VAR: &str = "SLURM_PROCID";
const LOCAL_RANK_VAR: &str = "SLURM_LOCALID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionIdentity {
    pub global_rank: Option<u32>,
    pub local_rank: Option<u32>,
}

impl ExecutionIdentity {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let rank = |var: &str| lookup(var).and_then(|v| v.trim().parse().ok());
        Self {
            global_rank: rank(GLOBAL_RANK_VAR),
            local_rank: rank(LOCAL_RANK_VAR),
        }
    }
}

impl fmt::Display for ExecutionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |rank: Option<u32>| rank.map_or_else(|| "unknown".to_string(), |r| r.to_string());
        write!(
            f,
            "global_rank: {}, local_rank: {}",
            show(self.global_rank),
            show(self.local_rank)
        )
    }
}
