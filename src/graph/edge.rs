//! Edge representation: typed relations with a strength score

use super::node::{clamp_unit, EvidenceRef, MutationStatus, NodeId, NOISE_THRESHOLD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Create a new random EdgeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Relation carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Causes,
    CorrelatesWith,
    IsA,
    PartOf,
    Supports,
    Contradicts,
    SimilarTo,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "causes",
            Self::CorrelatesWith => "correlates_with",
            Self::IsA => "is_a",
            Self::PartOf => "part_of",
            Self::Supports => "supports",
            Self::Contradicts => "contradicts",
            Self::SimilarTo => "similar_to",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub relation: Relation,
    /// Strength in [0, 1]
    pub strength: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
    pub status: MutationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) seq: u64,
}

impl Edge {
    /// Create a new edge (strength 0.5)
    pub fn new(source: NodeId, target: NodeId, relation: Relation) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            relation,
            strength: 0.5,
            description: String::new(),
            evidence: Vec::new(),
            status: MutationStatus::New,
            created_at: Utc::now(),
            seq: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the strength, clamped into [0, 1]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = clamp_unit(strength);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceRef) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn is_live(&self) -> bool {
        self.status != MutationStatus::Removed
    }

    pub fn is_noise(&self) -> bool {
        self.strength <= NOISE_THRESHOLD
    }

    /// True if the edge touches the given node
    pub fn touches(&self, node: &NodeId) -> bool {
        self.source == *node || self.target == *node
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl From<String> for EdgeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_round_trips_through_serde() {
        let json = serde_json::to_string(&Relation::CorrelatesWith).unwrap();
        assert_eq!(json, "\"correlates_with\"");
        let back: Relation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Relation::CorrelatesWith);
    }

    #[test]
    fn strength_is_clamped() {
        let edge = Edge::new("a".into(), "b".into(), Relation::Supports).with_strength(3.0);
        assert_eq!(edge.strength, 1.0);
        assert!(!edge.is_noise());
    }

    #[test]
    fn touches_either_endpoint() {
        let edge = Edge::new("a".into(), "b".into(), Relation::Causes);
        assert!(edge.touches(&"a".into()));
        assert!(edge.touches(&"b".into()));
        assert!(!edge.touches(&"c".into()));
    }
}
