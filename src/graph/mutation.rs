//! Status-tagged deltas applied through `KnowledgeGraph::mutate`

use super::edge::{Edge, EdgeId, Relation};
use super::node::{EvidenceRef, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

/// A single graph delta.
///
/// Additions are tagged `new`, patches `updated` and removals `removed`
/// (tombstones) when applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddNode(Node),
    AddEdge(Edge),
    UpdateNode { id: NodeId, patch: NodePatch },
    UpdateEdge { id: EdgeId, patch: EdgePatch },
    RemoveNode { id: NodeId },
    RemoveEdge { id: EdgeId },
}

impl Mutation {
    /// Short name used in logs and audit entries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddNode(_) => "add_node",
            Self::AddEdge(_) => "add_edge",
            Self::UpdateNode { .. } => "update_node",
            Self::UpdateEdge { .. } => "update_edge",
            Self::RemoveNode { .. } => "remove_node",
            Self::RemoveEdge { .. } => "remove_edge",
        }
    }

    /// Identifier of the element this mutation targets
    pub fn target(&self) -> String {
        match self {
            Self::AddNode(node) => node.id.to_string(),
            Self::AddEdge(edge) => edge.id.to_string(),
            Self::UpdateNode { id, .. } | Self::RemoveNode { id } => id.to_string(),
            Self::UpdateEdge { id, .. } | Self::RemoveEdge { id } => id.to_string(),
        }
    }
}

/// Field-level changes to a node. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Evidence appended to the existing list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_constraints: Vec<String>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn evidence(mut self, evidence: EvidenceRef) -> Self {
        self.add_evidence.push(evidence);
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.add_constraints.push(constraint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Field-level changes to an edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_evidence: Vec<EvidenceRef>,
}

impl EdgePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn evidence(mut self, evidence: EvidenceRef) -> Self {
        self.add_evidence.push(evidence);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
