//! The result of a run and the errors a run can surface

use super::phase::PhaseRecord;
use crate::allocator::EffortTier;
use crate::graph::{GraphSummary, KnowledgeGraph};
use crate::storage::{CheckpointId, StorageError};
use crate::validate::{AuditLog, Issue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the orchestrator.
///
/// `ContextOverflow` and `Internal` are normally absorbed by the recovery
/// path; only storage failures, a missing checkpoint on resume, and
/// (through `SynthesisOutput::ensure_complete`) exhausted recovery reach the
/// caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("context overflow: {observed} live elements exceed limit {limit}")]
    ContextOverflow { observed: usize, limit: usize },

    #[error("recovery exhausted after {attempts} attempts: {reason}")]
    RecoveryExhausted { attempts: u32, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no checkpoint found for topic: {0}")]
    NoCheckpoint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Why a synthesis was produced from partial data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub reason: String,
    /// Recovery attempts made before giving up
    pub attempts: u32,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub topic: String,
    pub tier: EffortTier,
    pub rounds_completed: u32,
    /// Final graph, tombstones compacted away
    pub graph: KnowledgeGraph,
    pub summary: GraphSummary,
    /// Set when the graph is partial; never silently absent in that case
    pub degradation: Option<Degradation>,
    pub unresolved_issues: Vec<Issue>,
    pub open_gaps: Vec<String>,
    pub next_actions: Vec<String>,
    pub audit: AuditLog,
    /// Checkpoints written during the run, oldest first
    pub checkpoints: Vec<CheckpointId>,
    pub trace: Vec<PhaseRecord>,
}

impl SynthesisOutput {
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }

    /// Turn a degraded result into `RecoveryExhausted`, for callers that
    /// cannot use partial data
    pub fn ensure_complete(self) -> Result<Self, OrchestratorError> {
        match self.degradation {
            Some(Degradation { reason, attempts }) => {
                Err(OrchestratorError::RecoveryExhausted { attempts, reason })
            }
            None => Ok(self),
        }
    }
}
