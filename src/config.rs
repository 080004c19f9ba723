//! Orchestrator configuration, loadable from YAML
//!
//! Every section falls back to its defaults, so an empty document is a
//! valid configuration:
//!
//! ```yaml
//! graph:
//!   noise_budget: 0.3
//! pool:
//!   round_timeout_ms: 60000
//! checkpoint:
//!   interval: 1
//! ```

use crate::agent::PoolSettings;
use crate::allocator::AllocatorConfig;
use crate::checkpoint::CheckpointSettings;
use crate::graph::{DEFAULT_NOISE_BUDGET, DEFAULT_TOPOLOGY_TARGET};
use crate::round::OverflowSettings;
use crate::validate::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Budgets every graph of a run is created with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub noise_budget: f64,
    pub topology_target: f64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            noise_budget: DEFAULT_NOISE_BUDGET,
            topology_target: DEFAULT_TOPOLOGY_TARGET,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub graph: GraphSettings,
    pub allocator: AllocatorConfig,
    pub pool: PoolSettings,
    pub validator: ValidatorConfig,
    pub checkpoint: CheckpointSettings,
    pub overflow: OverflowSettings,
}

impl OrchestratorConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        unit("graph.noise_budget", self.graph.noise_budget)?;
        if self.graph.topology_target.is_nan() || self.graph.topology_target <= 0.0 {
            return invalid("graph.topology_target must be positive");
        }

        if self.allocator.moderate_threshold > self.allocator.complex_threshold {
            return invalid("allocator.moderate_threshold exceeds allocator.complex_threshold");
        }

        if self.pool.worker_timeout_ms == 0 || self.pool.round_timeout_ms == 0 {
            return invalid("pool timeouts must be non-zero");
        }

        unit("validator.falsifier_confidence", self.validator.falsifier_confidence)?;
        unit("validator.falsifier_strength", self.validator.falsifier_strength)?;
        unit("validator.demotion_cap", self.validator.demotion_cap)?;
        if self.validator.demotion_cap > 0.5 {
            return invalid("validator.demotion_cap must not exceed 0.5");
        }

        let cp = &self.checkpoint;
        if cp.keep_latest == 0 || cp.max_nodes == 0 || cp.max_edges == 0 {
            return invalid("checkpoint caps must be non-zero");
        }
        unit("checkpoint.high_confidence", cp.high_confidence)?;
        unit("checkpoint.strong_edge", cp.strong_edge)?;
        if cp.interval == Some(0) {
            return invalid("checkpoint.interval must be at least 1");
        }

        let ov = &self.overflow;
        if ov.max_live_elements == 0 {
            return invalid("overflow.max_live_elements must be non-zero");
        }
        if ov.compression.max_nodes == 0 || ov.compression.max_edges == 0 {
            return invalid("overflow.compression caps must be non-zero");
        }
        unit("overflow.compression.min_confidence", ov.compression.min_confidence)?;
        unit("overflow.compression.min_strength", ov.compression.min_strength)?;
        Ok(())
    }
}

fn unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        invalid(&format!("{field} must lie in [0, 1], got {value}"))
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}
