//! Integration results and per-item rejection types

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

/// Why an individual proposed item was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Edge references a node that is neither in the graph nor added this round
    DanglingReference { missing: NodeId },
    /// Update or removal targets an element that is absent or tombstoned
    UnknownTarget,
    /// Addition reuses an identifier that already exists
    DuplicateId,
    /// A higher-priority proposal already updated this target this round
    Conflict { winner: String },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference { missing } => write!(f, "dangling reference to {}", missing),
            Self::UnknownTarget => write!(f, "unknown target"),
            Self::DuplicateId => write!(f, "duplicate id"),
            Self::Conflict { winner } => write!(f, "conflicts with assignment {}", winner),
        }
    }
}

/// A single rejected item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Assignment whose proposal carried the item
    pub assignment_id: String,
    /// Mutation kind (`add_node`, `update_edge`, ...)
    pub mutation: String,
    /// Identifier of the rejected element
    pub target: String,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(
        assignment_id: impl Into<String>,
        mutation: impl Into<String>,
        target: impl Into<String>,
        reason: RejectionReason,
    ) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            mutation: mutation.into(),
            target: target.into(),
            reason,
        }
    }
}

/// What one integration batch committed and rejected.
///
/// Partial success is the normal case: valid items commit even when
/// others are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub updates_applied: usize,
    pub removals_applied: usize,
    pub rejections: Vec<Rejection>,
    /// Open items raised this round, deduplicated in first-seen order
    pub gaps: Vec<String>,
    /// Items proposals marked as closed
    pub resolved_gaps: Vec<String>,
}

impl IntegrationReport {
    /// Mutations that changed the graph
    pub fn changed(&self) -> usize {
        self.nodes_added + self.edges_added + self.updates_applied + self.removals_applied
    }

    pub fn is_fully_committed(&self) -> bool {
        self.rejections.is_empty()
    }

    /// True if nothing was committed and nothing was rejected
    pub fn is_noop(&self) -> bool {
        self.changed() == 0 && self.rejections.is_empty()
    }
}
