//! Serialized checkpoint records
//!
//! A condensed record holds exactly: metadata, a graph summary, at most 20
//! nodes, at most 40 edges, at most 10 open gaps and the next-action list.
//! A full record holds the complete graph.

use crate::graph::{
    Edge, EdgeId, EvidenceRef, GraphSummary, KnowledgeGraph, Node, NodeId, NodeKind, Relation,
};
use crate::storage::CheckpointId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format version written into every record
pub const CHECKPOINT_VERSION: u32 = 1;

/// Evidence citations kept per condensed node
pub(crate) const CONDENSED_EVIDENCE: usize = 3;

/// Loop state saved alongside the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    /// Rounds completed
    pub round: u32,
    /// Round budget of the run
    pub total_rounds: u32,
    pub open_gaps: Vec<String>,
    pub next_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub version: u32,
    pub id: CheckpointId,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    pub total_rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

impl CondensedNode {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind,
            confidence: node.confidence,
            description: node.description.clone(),
            evidence: node.evidence.iter().take(CONDENSED_EVIDENCE).cloned().collect(),
        }
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.label.clone(), self.kind)
            .with_id(self.id.clone())
            .with_confidence(self.confidence)
            .with_description(self.description.clone());
        node.evidence = self.evidence.clone();
        node
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub relation: Relation,
    pub strength: f64,
}

impl CondensedEdge {
    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            relation: edge.relation,
            strength: edge.strength,
        }
    }

    pub fn to_edge(&self) -> Edge {
        Edge::new(self.source.clone(), self.target.clone(), self.relation)
            .with_id(self.id.clone())
            .with_strength(self.strength)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedRecord {
    pub metadata: CheckpointMetadata,
    pub summary: GraphSummary,
    pub nodes: Vec<CondensedNode>,
    pub edges: Vec<CondensedEdge>,
    pub open_gaps: Vec<String>,
    pub next_actions: Vec<String>,
}

/// Complete snapshot, as read back
#[derive(Debug, Clone, Deserialize)]
pub struct FullRecord {
    pub metadata: CheckpointMetadata,
    pub graph: KnowledgeGraph,
    pub open_gaps: Vec<String>,
    pub next_actions: Vec<String>,
}

/// Complete snapshot, as written (borrows the graph)
#[derive(Debug, Serialize)]
pub(crate) struct FullRecordRef<'a> {
    pub metadata: &'a CheckpointMetadata,
    pub graph: &'a KnowledgeGraph,
    pub open_gaps: &'a [String],
    pub next_actions: &'a [String],
}
