//! Node representation in the knowledge graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
///
/// Serializes as a plain string (UUID or semantic ID like "claim:mortality")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a NodeId from a string (semantic ID)
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Entity,
    Concept,
    Process,
    Dataset,
    /// A falsifiable assertion; must always face at least one contradiction
    Claim,
    /// An acknowledged gap rather than a resolved fact
    Placeholder,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Concept => "concept",
            Self::Process => "process",
            Self::Dataset => "dataset",
            Self::Claim => "claim",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Mutation status shared by nodes and edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    #[default]
    New,
    Updated,
    Unchanged,
    /// Tombstoned: kept for audit until compaction
    Removed,
}

/// Reference to a piece of evidence backing a node or edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Opaque source identifier (as returned by an evidence provider)
    pub source_id: String,
    pub note: String,
}

impl EvidenceRef {
    pub fn new(source_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            note: note.into(),
        }
    }
}

/// Node metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// When the node was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the node was last modified
    pub modified_at: Option<DateTime<Utc>>,
    /// Round in which the node entered the graph
    pub round: Option<u32>,
}

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub description: String,
    pub kind: NodeKind,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub status: MutationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    /// Insertion sequence assigned by the graph; drives deterministic ordering
    #[serde(default)]
    pub(crate) seq: u64,
}

impl Node {
    /// Create a new node with the given label and kind (confidence 0.5)
    pub fn new(label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            label: label.into(),
            description: String::new(),
            kind,
            confidence: 0.5,
            status: MutationStatus::New,
            evidence: Vec::new(),
            constraints: Vec::new(),
            metadata: NodeMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
            seq: 0,
        }
    }

    /// Use a specific identifier
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the confidence, clamped into [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
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

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// True unless the node has been tombstoned
    pub fn is_live(&self) -> bool {
        self.status != MutationStatus::Removed
    }

    /// Low-confidence nodes count toward the noise budget
    pub fn is_noise(&self) -> bool {
        self.confidence <= NOISE_THRESHOLD
    }

    /// Insertion sequence within the owning graph
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Elements at or below this confidence/strength count as noise
pub const NOISE_THRESHOLD: f64 = 0.5;

/// Clamp a score into [0, 1]; NaN collapses to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
