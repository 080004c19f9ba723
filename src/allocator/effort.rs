//! Effort tiers and the resource budget each one grants

use serde::{Deserialize, Serialize};

/// Complexity tier chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortTier {
    Simple,
    Moderate,
    Complex,
}

impl EffortTier {
    /// The budget granted to this tier
    pub fn profile(self) -> EffortProfile {
        match self {
            Self::Simple => EffortProfile {
                tier: self,
                worker_count: 1,
                max_calls_per_worker: 10,
                max_rounds: 3,
                checkpoint_interval: 1,
            },
            Self::Moderate => EffortProfile {
                tier: self,
                worker_count: 3,
                max_calls_per_worker: 30,
                max_rounds: 5,
                checkpoint_interval: 2,
            },
            Self::Complex => EffortProfile {
                tier: self,
                worker_count: 7,
                max_calls_per_worker: 100,
                max_rounds: 9,
                checkpoint_interval: 3,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for EffortTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource budget for one orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortProfile {
    pub tier: EffortTier,
    /// Concurrent workers per round
    pub worker_count: usize,
    /// Tool invocations allowed to each worker
    pub max_calls_per_worker: usize,
    pub max_rounds: u32,
    /// Rounds between checkpoints
    pub checkpoint_interval: u32,
}

impl EffortProfile {
    /// Override the checkpoint cadence (never below one round)
    pub fn with_checkpoint_interval(mut self, interval: u32) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    /// True when `round` lands on the checkpoint cadence
    pub fn is_checkpoint_round(&self, round: u32) -> bool {
        round > 0 && round % self.checkpoint_interval.max(1) == 0
    }
}
