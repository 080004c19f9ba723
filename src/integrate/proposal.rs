//! Worker output: proposed graph deltas
//!
//! Workers never touch the graph. They return a `DeltaProposal`; the pool
//! wraps each successful one in a `ProposalEnvelope` carrying the
//! assignment's priority and dispatch position, which fix the order in
//! which the integrator applies it.

use crate::graph::{Edge, EdgeId, EdgePatch, Mutation, Node, NodeId, NodePatch};
use serde::{Deserialize, Serialize};

/// A proposed field-level change to an existing element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ProposedUpdate {
    Node { id: NodeId, patch: NodePatch },
    Edge { id: EdgeId, patch: EdgePatch },
}

impl ProposedUpdate {
    /// Identifier of the targeted element
    pub fn target(&self) -> String {
        match self {
            Self::Node { id, .. } => id.to_string(),
            Self::Edge { id, .. } => id.to_string(),
        }
    }

    pub fn into_mutation(self) -> Mutation {
        match self {
            Self::Node { id, patch } => Mutation::UpdateNode { id, patch },
            Self::Edge { id, patch } => Mutation::UpdateEdge { id, patch },
        }
    }
}

/// A proposed removal (applied as a tombstone)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum ProposedRemoval {
    Node(NodeId),
    Edge(EdgeId),
}

impl ProposedRemoval {
    pub fn target(&self) -> String {
        match self {
            Self::Node(id) => id.to_string(),
            Self::Edge(id) => id.to_string(),
        }
    }

    pub fn into_mutation(self) -> Mutation {
        match self {
            Self::Node(id) => Mutation::RemoveNode { id },
            Self::Edge(id) => Mutation::RemoveEdge { id },
        }
    }
}

/// Everything one worker proposes for one round
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaProposal {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub updates: Vec<ProposedUpdate>,
    #[serde(default)]
    pub removals: Vec<ProposedRemoval>,
    /// Open items the worker could not resolve
    #[serde(default)]
    pub gaps: Vec<String>,
    /// Previously open items this worker closed
    #[serde(default)]
    pub resolved_gaps: Vec<String>,
}

impl DeltaProposal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_node_update(mut self, id: impl Into<NodeId>, patch: NodePatch) -> Self {
        self.updates.push(ProposedUpdate::Node { id: id.into(), patch });
        self
    }

    pub fn with_edge_update(mut self, id: impl Into<EdgeId>, patch: EdgePatch) -> Self {
        self.updates.push(ProposedUpdate::Edge { id: id.into(), patch });
        self
    }

    pub fn with_node_removal(mut self, id: impl Into<NodeId>) -> Self {
        self.removals.push(ProposedRemoval::Node(id.into()));
        self
    }

    pub fn with_edge_removal(mut self, id: impl Into<EdgeId>) -> Self {
        self.removals.push(ProposedRemoval::Edge(id.into()));
        self
    }

    pub fn with_gap(mut self, gap: impl Into<String>) -> Self {
        self.gaps.push(gap.into());
        self
    }

    pub fn resolving(mut self, gap: impl Into<String>) -> Self {
        self.resolved_gaps.push(gap.into());
        self
    }

    /// True if the proposal would not touch the graph
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.updates.is_empty()
            && self.removals.is_empty()
    }
}

/// A successful proposal with the attribution the integrator orders by
#[derive(Debug, Clone)]
pub struct ProposalEnvelope {
    pub assignment_id: String,
    /// Higher priority applies first
    pub priority: u8,
    /// Position of the assignment in the round's dispatch list
    pub dispatch_index: usize,
    pub delta: DeltaProposal,
}

impl ProposalEnvelope {
    pub fn new(assignment_id: impl Into<String>, priority: u8, dispatch_index: usize, delta: DeltaProposal) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            priority,
            dispatch_index,
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, Relation};

    #[test]
    fn builder_collects_all_parts() {
        let a = Node::new("a", NodeKind::Entity).with_id("a");
        let b = Node::new("b", NodeKind::Entity).with_id("b");
        let proposal = DeltaProposal::new()
            .with_edge(Edge::new("a".into(), "b".into(), Relation::PartOf))
            .with_node(a)
            .with_node(b)
            .with_node_update("c", NodePatch::new().confidence(0.2))
            .with_node_removal("d")
            .with_gap("dosage unknown");
        assert_eq!(proposal.nodes.len(), 2);
        assert_eq!(proposal.updates[0].target(), "c");
        assert_eq!(proposal.removals[0].target(), "d");
        assert!(!proposal.is_empty());
    }

    #[test]
    fn gaps_alone_leave_proposal_empty() {
        let proposal = DeltaProposal::new().with_gap("unknown").resolving("old");
        assert!(proposal.is_empty());
    }

    #[test]
    fn proposal_deserializes_with_missing_sections() {
        let proposal: DeltaProposal = serde_json::from_str(r#"{"gaps": ["x"]}"#).unwrap();
        assert!(proposal.is_empty());
        assert_eq!(proposal.gaps, vec!["x"]);
    }

    #[test]
    fn removal_serializes_with_target_tag() {
        let json = serde_json::to_value(ProposedRemoval::Node("n1".into())).unwrap();
        assert_eq!(json["target"], "node");
        assert_eq!(json["id"], "n1");
    }
}
