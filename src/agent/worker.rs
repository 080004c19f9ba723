//! Worker trait: the contract research agents implement
//!
//! A worker receives an assignment, a read-only snapshot of the graph and a
//! budgeted toolbox, and returns a delta proposal. It never mutates the
//! graph; everything it wants changed goes through the proposal.

use super::role::TaskAssignment;
use super::tools::ToolBox;
use crate::graph::KnowledgeGraph;
use crate::integrate::DeltaProposal;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Why a worker produced no usable output
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerFailure {
    #[error("worker timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("tool error: {0}")]
    ToolError(String),

    #[error("output contract violated: {0}")]
    ContractViolation(String),
}

impl WorkerFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ToolError(_) => "tool_error",
            Self::ContractViolation(_) => "contract_violation",
        }
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable identifier, used in logs
    fn id(&self) -> &str;

    /// Carry out one assignment
    async fn run(
        &self,
        assignment: &TaskAssignment,
        snapshot: Arc<KnowledgeGraph>,
        tools: &ToolBox,
    ) -> Result<DeltaProposal, WorkerFailure>;
}
