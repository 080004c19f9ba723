//! KnowledgeGraph: the single-writer node/edge store for one run
//!
//! Nodes are addressed by stable identifier (arena-style, never by pointer).
//! Every node and edge carries an insertion sequence shared across both
//! collections; all deterministic tie-breaks (duplicate labels, noise
//! demotion, retention ranking) order by it.

use super::edge::{Edge, EdgeId, Relation};
use super::mutation::{EdgePatch, Mutation, NodePatch};
use super::node::{clamp_unit, MutationStatus, Node, NodeId, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Default minimum fraction of low-confidence elements
pub const DEFAULT_NOISE_BUDGET: f64 = 0.25;
/// Default minimum edge/node ratio
pub const DEFAULT_TOPOLOGY_TARGET: f64 = 4.0;

/// Placeholders fill at most `1 / PLACEHOLDER_DIVISOR` of a retention cap
const PLACEHOLDER_DIVISOR: usize = 4;

/// Errors raised by graph operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("dangling reference: edge {edge} points at absent node {missing}")]
    DanglingReference { edge: EdgeId, missing: NodeId },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("edge already exists: {0}")]
    DuplicateEdge(EdgeId),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Point-in-time structural metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub tombstoned: usize,
    pub claims: usize,
    pub placeholders: usize,
    pub topology_ratio: f64,
    pub noise_ratio: f64,
}

/// Caps and thresholds for emergency in-place compression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
    pub max_nodes: usize,
    pub max_edges: usize,
    /// Nodes below this confidence are discarded (placeholders excepted)
    pub min_confidence: f64,
    /// Edges below this strength are discarded (contradictions excepted)
    pub min_strength: f64,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_nodes: 30,
            max_edges: 60,
            min_confidence: 0.5,
            min_strength: 0.5,
        }
    }
}

/// What a compaction or compression pass dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReport {
    pub nodes_dropped: usize,
    pub edges_dropped: usize,
}

/// Graph metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The knowledge graph for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    /// Topic (the originating request)
    pub topic: String,
    /// Rounds completed so far
    pub round: u32,
    /// Minimum fraction of elements at confidence/strength <= 0.5
    pub noise_budget: f64,
    /// Minimum live edge count / live node count
    pub topology_target: f64,
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    next_seq: u64,
    version: u64,
    #[serde(default)]
    pub metadata: GraphMetadata,
}

impl KnowledgeGraph {
    /// Create an empty graph with default budgets
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            round: 0,
            noise_budget: DEFAULT_NOISE_BUDGET,
            topology_target: DEFAULT_TOPOLOGY_TARGET,
            nodes: HashMap::new(),
            edges: Vec::new(),
            next_seq: 0,
            version: 0,
            metadata: GraphMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    pub fn with_noise_budget(mut self, budget: f64) -> Self {
        self.noise_budget = clamp_unit(budget);
        self
    }

    pub fn with_topology_target(mut self, target: f64) -> Self {
        self.topology_target = target.max(0.0);
        self
    }

    /// Monotonic counter bumped by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    // === Writes ===

    /// Add a node. An existing id is replaced in place (keeping its
    /// insertion position) and tagged `updated`.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = node.id.clone();
        node.confidence = clamp_unit(node.confidence);
        match self.nodes.get(&id) {
            Some(existing) => {
                node.seq = existing.seq;
                if node.status != MutationStatus::Removed {
                    node.status = MutationStatus::Updated;
                }
            }
            None => {
                node.seq = self.bump_seq();
            }
        }
        if node.metadata.round.is_none() {
            node.metadata.round = Some(self.round);
        }
        self.nodes.insert(id.clone(), node);
        self.touch();
        id
    }

    /// Add an edge. Both endpoints must be live nodes.
    pub fn add_edge(&mut self, mut edge: Edge) -> GraphResult<EdgeId> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.is_live_node(endpoint) {
                return Err(GraphError::DanglingReference {
                    edge: edge.id.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        edge.strength = clamp_unit(edge.strength);
        edge.seq = self.bump_seq();
        let id = edge.id.clone();
        self.edges.push(edge);
        self.touch();
        Ok(id)
    }

    /// Apply one status-tagged delta
    pub fn mutate(&mut self, mutation: Mutation) -> GraphResult<()> {
        match mutation {
            Mutation::AddNode(node) => {
                self.add_node(node);
                Ok(())
            }
            Mutation::AddEdge(edge) => self.add_edge(edge).map(|_| ()),
            Mutation::UpdateNode { id, patch } => self.update_node(&id, patch),
            Mutation::UpdateEdge { id, patch } => self.update_edge(&id, patch),
            Mutation::RemoveNode { id } => self.remove_node(&id),
            Mutation::RemoveEdge { id } => self.remove_edge(&id),
        }
    }

    fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .filter(|n| n.is_live())
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        if let Some(label) = patch.label {
            node.label = label;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(kind) = patch.kind {
            node.kind = kind;
        }
        if let Some(confidence) = patch.confidence {
            node.confidence = clamp_unit(confidence);
        }
        node.evidence.extend(patch.add_evidence);
        node.constraints.extend(patch.add_constraints);
        // A node added this round stays `new`
        if node.status != MutationStatus::New {
            node.status = MutationStatus::Updated;
        }
        node.metadata.modified_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    fn update_edge(&mut self, id: &EdgeId, patch: EdgePatch) -> GraphResult<()> {
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == *id && e.is_live())
            .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))?;

        if let Some(relation) = patch.relation {
            edge.relation = relation;
        }
        if let Some(strength) = patch.strength {
            edge.strength = clamp_unit(strength);
        }
        if let Some(description) = patch.description {
            edge.description = description;
        }
        edge.evidence.extend(patch.add_evidence);
        if edge.status != MutationStatus::New {
            edge.status = MutationStatus::Updated;
        }
        self.touch();
        Ok(())
    }

    /// Tombstone a node. Its edges are left for the validator to tombstone.
    fn remove_node(&mut self, id: &NodeId) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .filter(|n| n.is_live())
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        node.status = MutationStatus::Removed;
        node.metadata.modified_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    fn remove_edge(&mut self, id: &EdgeId) -> GraphResult<()> {
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == *id && e.is_live())
            .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))?;
        edge.status = MutationStatus::Removed;
        self.touch();
        Ok(())
    }

    /// Reset `new`/`updated` statuses to `unchanged` so that statuses
    /// describe only the round about to be integrated.
    pub fn settle(&mut self) {
        for node in self.nodes.values_mut() {
            if matches!(node.status, MutationStatus::New | MutationStatus::Updated) {
                node.status = MutationStatus::Unchanged;
            }
        }
        for edge in &mut self.edges {
            if matches!(edge.status, MutationStatus::New | MutationStatus::Updated) {
                edge.status = MutationStatus::Unchanged;
            }
        }
    }

    /// Physically drop tombstoned nodes and edges
    pub fn compact(&mut self) -> DropReport {
        let nodes_before = self.nodes.len();
        let edges_before = self.edges.len();
        self.nodes.retain(|_, n| n.is_live());
        let nodes = &self.nodes;
        self.edges.retain(|e| {
            e.is_live()
                && nodes.contains_key(&e.source)
                && nodes.contains_key(&e.target)
        });
        let report = DropReport {
            nodes_dropped: nodes_before - self.nodes.len(),
            edges_dropped: edges_before - self.edges.len(),
        };
        if report != DropReport::default() {
            self.touch();
        }
        report
    }

    /// Emergency in-place compression: keep only what `retention` selects
    pub fn compress(&mut self, policy: &CompressionPolicy) -> DropReport {
        let (keep_nodes, keep_edges) = {
            let (nodes, edges) = self.retention(
                policy.max_nodes,
                policy.max_edges,
                policy.min_confidence,
                policy.min_strength,
            );
            let n: HashSet<NodeId> = nodes.into_iter().map(|n| n.id.clone()).collect();
            let e: HashSet<EdgeId> = edges.into_iter().map(|e| e.id.clone()).collect();
            (n, e)
        };
        let nodes_before = self.nodes.len();
        let edges_before = self.edges.len();
        self.nodes.retain(|id, _| keep_nodes.contains(id));
        self.edges.retain(|e| keep_edges.contains(&e.id));
        self.touch();
        DropReport {
            nodes_dropped: nodes_before - self.nodes.len(),
            edges_dropped: edges_before - self.edges.len(),
        }
    }

    /// Rank live elements for retention under a size cap.
    ///
    /// Nodes: non-placeholders at or above `min_confidence` by confidence
    /// descending, then insertion order. Placeholders share at most a
    /// quarter of the cap: gap placeholders (no outgoing `contradicts`)
    /// first, then falsifiers whose contradicted node is retained. Slots
    /// placeholders leave unused go back to the ranked nodes.
    /// Edges: between retained nodes only; contradictions first, then
    /// strength descending; edges below `min_strength` are only kept if
    /// contradictions.
    pub fn retention(
        &self,
        max_nodes: usize,
        max_edges: usize,
        min_confidence: f64,
        min_strength: f64,
    ) -> (Vec<&Node>, Vec<&Edge>) {
        let mut ranked: Vec<&Node> = self
            .live_nodes()
            .filter(|n| n.kind != NodeKind::Placeholder && n.confidence >= min_confidence)
            .collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.seq.cmp(&b.seq))
        });
        let placeholders: Vec<&Node> = self
            .live_nodes_ordered()
            .into_iter()
            .filter(|n| n.kind == NodeKind::Placeholder)
            .collect();
        let reserved = placeholders
            .len()
            .min(max_nodes.div_ceil(PLACEHOLDER_DIVISOR));

        let taken = ranked.len().min(max_nodes - reserved);
        let mut nodes: Vec<&Node> = ranked[..taken].to_vec();
        let retained: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

        let (gaps, falsifiers): (Vec<&Node>, Vec<&Node>) = placeholders
            .into_iter()
            .partition(|p| self.contradicted_by(&p.id).next().is_none());
        let chosen: Vec<&Node> = gaps
            .into_iter()
            .chain(falsifiers.into_iter().filter(|p| {
                self.contradicted_by(&p.id)
                    .any(|target| retained.contains(target))
            }))
            .take(reserved)
            .collect();

        let backfill = (max_nodes - taken - chosen.len()).min(ranked.len() - taken);
        nodes.extend_from_slice(&ranked[taken..taken + backfill]);
        nodes.extend(chosen);

        let kept: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let mut edges: Vec<&Edge> = self
            .live_edges()
            .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
            .filter(|e| e.relation == Relation::Contradicts || e.strength >= min_strength)
            .collect();
        edges.sort_by(|a, b| {
            let ca = a.relation == Relation::Contradicts;
            let cb = b.relation == Relation::Contradicts;
            cb.cmp(&ca)
                .then(b.strength.total_cmp(&a.strength))
                .then(a.seq.cmp(&b.seq))
        });
        edges.truncate(max_edges);

        // Restore insertion order for stable output
        nodes.sort_by_key(|n| n.seq);
        edges.sort_by_key(|e| e.seq);
        (nodes, edges)
    }

    // === Reads ===

    /// Get a node by ID, including tombstoned nodes
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a live node by ID
    pub fn live_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).filter(|n| n.is_live())
    }

    pub fn is_live_node(&self, id: &NodeId) -> bool {
        self.live_node(id).is_some()
    }

    /// Get an edge by ID, including tombstoned edges
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == *id)
    }

    /// All nodes (tombstones included) in insertion order
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// All edges (tombstones included) in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Live nodes, unordered
    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_live())
    }

    /// Live nodes in insertion order
    pub fn live_nodes_ordered(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.live_nodes().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// Live edges in insertion order
    pub fn live_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_live())
    }

    /// Live edges of the given relation pointing at `target`
    pub fn incoming<'a>(
        &'a self,
        target: &'a NodeId,
        relation: Relation,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.live_edges()
            .filter(move |e| e.target == *target && e.relation == relation)
    }

    /// Targets of the live `contradicts` edges leaving `source`
    fn contradicted_by<'a>(&'a self, source: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.live_edges()
            .filter(move |e| e.source == *source && e.relation == Relation::Contradicts)
            .map(|e| &e.target)
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.live_nodes().count()
    }

    /// Number of live edges
    pub fn edge_count(&self) -> usize {
        self.live_edges().count()
    }

    /// Live nodes plus live edges
    pub fn element_count(&self) -> usize {
        self.node_count() + self.edge_count()
    }

    /// Live elements at or below the noise threshold
    pub fn noise_count(&self) -> usize {
        self.live_nodes().filter(|n| n.is_noise()).count()
            + self.live_edges().filter(|e| e.is_noise()).count()
    }

    /// |edges| / max(1, |nodes|) over live elements
    pub fn topology_ratio(&self) -> f64 {
        self.edge_count() as f64 / self.node_count().max(1) as f64
    }

    /// Low-confidence elements / max(1, |nodes| + |edges|) over live elements
    pub fn noise_ratio(&self) -> f64 {
        self.noise_count() as f64 / self.element_count().max(1) as f64
    }

    pub fn noise_budget_met(&self) -> bool {
        self.noise_ratio() + f64::EPSILON >= self.noise_budget
    }

    pub fn topology_met(&self) -> bool {
        self.topology_ratio() + f64::EPSILON >= self.topology_target
    }

    /// Nodes and edges (tombstones included) whose status is not `unchanged`
    pub fn changed_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.status != MutationStatus::Unchanged)
            .count()
            + self
                .edges
                .iter()
                .filter(|e| e.status != MutationStatus::Unchanged)
                .count()
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            tombstoned: self.nodes.values().filter(|n| !n.is_live()).count()
                + self.edges.iter().filter(|e| !e.is_live()).count(),
            claims: self.live_nodes().filter(|n| n.kind == NodeKind::Claim).count(),
            placeholders: self
                .live_nodes()
                .filter(|n| n.kind == NodeKind::Placeholder)
                .count(),
            topology_ratio: self.topology_ratio(),
            noise_ratio: self.noise_ratio(),
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn touch(&mut self) {
        self.version += 1;
        self.metadata.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EvidenceRef, NodeKind};

    fn node(id: &str, confidence: f64) -> Node {
        Node::new(id, NodeKind::Concept).with_id(id).with_confidence(confidence)
    }

    #[test]
    fn add_edge_rejects_absent_endpoint() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        let err = graph
            .add_edge(Edge::new("a".into(), "ghost".into(), Relation::Supports))
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference { missing, .. } if missing.as_str() == "ghost"));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn add_edge_rejects_tombstoned_endpoint() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.add_node(node("b", 0.9));
        graph.mutate(Mutation::RemoveNode { id: "b".into() }).unwrap();
        assert!(graph
            .add_edge(Edge::new("a".into(), "b".into(), Relation::Supports))
            .is_err());
    }

    #[test]
    fn ratios_guard_against_empty_graph() {
        let graph = KnowledgeGraph::new("t");
        assert_eq!(graph.topology_ratio(), 0.0);
        assert_eq!(graph.noise_ratio(), 0.0);
    }

    #[test]
    fn ratios_count_live_elements_only() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.add_node(node("b", 0.3));
        graph
            .add_edge(Edge::new("a".into(), "b".into(), Relation::Causes).with_strength(0.9))
            .unwrap();
        let weak = graph
            .add_edge(Edge::new("b".into(), "a".into(), Relation::Causes).with_strength(0.1))
            .unwrap();
        assert_eq!(graph.topology_ratio(), 1.0);
        assert_eq!(graph.noise_ratio(), 0.5);

        graph.mutate(Mutation::RemoveEdge { id: weak }).unwrap();
        assert_eq!(graph.topology_ratio(), 0.5);
        assert!((graph.noise_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn remove_tombstones_instead_of_deleting() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.mutate(Mutation::RemoveNode { id: "a".into() }).unwrap();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.node(&"a".into()).unwrap().status, MutationStatus::Removed);

        let report = graph.compact();
        assert_eq!(report.nodes_dropped, 1);
        assert!(graph.node(&"a".into()).is_none());
    }

    #[test]
    fn update_on_tombstone_fails() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.mutate(Mutation::RemoveNode { id: "a".into() }).unwrap();
        let err = graph
            .mutate(Mutation::UpdateNode {
                id: "a".into(),
                patch: NodePatch::new().confidence(0.1),
            })
            .unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("a".into()));
    }

    #[test]
    fn update_patches_fields_and_tags_status() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.settle();
        graph
            .mutate(Mutation::UpdateNode {
                id: "a".into(),
                patch: NodePatch::new()
                    .confidence(0.4)
                    .evidence(EvidenceRef::new("src-1", "trial"))
                    .label("renamed"),
            })
            .unwrap();
        let a = graph.node(&"a".into()).unwrap();
        assert_eq!(a.label, "renamed");
        assert_eq!(a.confidence, 0.4);
        assert_eq!(a.evidence.len(), 1);
        assert_eq!(a.status, MutationStatus::Updated);
    }

    #[test]
    fn upsert_keeps_insertion_position() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        graph.add_node(node("b", 0.9));
        graph.add_node(node("a", 0.2));
        let order: Vec<&str> = graph.live_nodes_ordered().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(graph.node(&"a".into()).unwrap().confidence, 0.2);
    }

    #[test]
    fn settle_resets_round_statuses() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(node("a", 0.9));
        assert_eq!(graph.changed_count(), 1);
        graph.settle();
        assert_eq!(graph.changed_count(), 0);
    }

    #[test]
    fn version_increases_with_every_write() {
        let mut graph = KnowledgeGraph::new("t");
        let v0 = graph.version();
        graph.add_node(node("a", 0.9));
        graph.add_node(node("b", 0.9));
        graph
            .add_edge(Edge::new("a".into(), "b".into(), Relation::IsA))
            .unwrap();
        assert_eq!(graph.version(), v0 + 3);
    }

    #[test]
    fn compress_keeps_placeholders_and_contradictions() {
        let mut graph = KnowledgeGraph::new("t");
        for i in 0..10 {
            graph.add_node(node(&format!("n{i}"), 0.6 + i as f64 * 0.03));
        }
        graph.add_node(node("low", 0.1));
        graph.add_node(
            Node::new("gap", NodeKind::Placeholder)
                .with_id("gap")
                .with_confidence(0.2),
        );
        graph
            .add_edge(Edge::new("gap".into(), "n9".into(), Relation::Contradicts).with_strength(0.3))
            .unwrap();
        graph
            .add_edge(Edge::new("n0".into(), "n1".into(), Relation::Supports).with_strength(0.2))
            .unwrap();
        graph
            .add_edge(Edge::new("n8".into(), "n9".into(), Relation::Supports).with_strength(0.9))
            .unwrap();

        let policy = CompressionPolicy {
            max_nodes: 4,
            max_edges: 10,
            min_confidence: 0.5,
            min_strength: 0.5,
        };
        let report = graph.compress(&policy);

        assert_eq!(graph.node_count(), 4);
        assert!(graph.is_live_node(&"gap".into()));
        assert!(graph.is_live_node(&"n9".into()));
        assert!(!graph.is_live_node(&"low".into()));
        assert_eq!(report.nodes_dropped, 8);
        let relations: Vec<Relation> = graph.live_edges().map(|e| e.relation).collect();
        assert!(relations.contains(&Relation::Contradicts));
        assert!(relations.contains(&Relation::Supports));
        assert_eq!(graph.edge_count(), 2);
    }

    /// `count` claims, each backed by an entity and challenged only by a
    /// synthesized falsifier
    fn claims_with_falsifiers(count: usize) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new("t");
        for i in 0..count {
            let (claim, entity, falsifier) = (format!("c{i}"), format!("e{i}"), format!("f{i}"));
            graph.add_node(
                Node::new(claim.as_str(), NodeKind::Claim)
                    .with_id(claim.as_str())
                    .with_confidence(0.95),
            );
            graph.add_node(
                Node::new(entity.as_str(), NodeKind::Entity)
                    .with_id(entity.as_str())
                    .with_confidence(0.95),
            );
            graph.add_node(
                Node::new(falsifier.as_str(), NodeKind::Placeholder)
                    .with_id(falsifier.as_str())
                    .with_confidence(0.2),
            );
            graph
                .add_edge(
                    Edge::new(entity.as_str().into(), claim.as_str().into(), Relation::Supports)
                        .with_strength(0.9),
                )
                .unwrap();
            graph
                .add_edge(
                    Edge::new(falsifier.as_str().into(), claim.as_str().into(), Relation::Contradicts)
                        .with_strength(0.3),
                )
                .unwrap();
        }
        graph
    }

    #[test]
    fn compress_keeps_real_nodes_when_falsifiers_outnumber_the_cap() {
        let mut graph = claims_with_falsifiers(25);

        graph.compress(&CompressionPolicy::default());

        assert_eq!(graph.node_count(), 30);
        let placeholders: Vec<&Node> = graph
            .live_nodes()
            .filter(|n| n.kind == NodeKind::Placeholder)
            .collect();
        assert_eq!(placeholders.len(), 8);
        assert_eq!(graph.live_nodes().filter(|n| n.kind == NodeKind::Claim).count(), 11);
        assert_eq!(graph.live_nodes().filter(|n| n.kind == NodeKind::Entity).count(), 11);
        // No falsifier outlives the claim it challenges
        for placeholder in placeholders {
            let target = graph
                .live_edges()
                .find(|e| e.source == placeholder.id && e.relation == Relation::Contradicts)
                .map(|e| e.target.clone())
                .unwrap();
            assert!(graph.is_live_node(&target));
        }
        assert_eq!(
            graph.live_edges().filter(|e| e.relation == Relation::Supports).count(),
            11
        );
    }

    #[test]
    fn retention_prefers_gap_placeholders_and_backfills_unused_slots() {
        let mut graph = KnowledgeGraph::new("t");
        for i in 0..6 {
            graph.add_node(node(&format!("n{i}"), 0.9 - i as f64 * 0.05));
        }
        graph.add_node(
            Node::new("open question", NodeKind::Placeholder)
                .with_id("gap")
                .with_confidence(0.2),
        );
        let (nodes, _) = graph.retention(4, 10, 0.5, 0.5);
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n0", "n1", "n2", "gap"]);

        // A falsifier of a dropped node gives its slot back
        let mut graph = KnowledgeGraph::new("t");
        for i in 0..6 {
            graph.add_node(node(&format!("n{i}"), 0.9 - i as f64 * 0.05));
        }
        graph.add_node(
            Node::new("falsifier", NodeKind::Placeholder)
                .with_id("f")
                .with_confidence(0.2),
        );
        graph
            .add_edge(Edge::new("f".into(), "n5".into(), Relation::Contradicts).with_strength(0.3))
            .unwrap();
        let (nodes, edges) = graph.retention(4, 10, 0.5, 0.5);
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n0", "n1", "n2", "n3"]);
        assert!(edges.is_empty());
    }

    #[test]
    fn graph_serializes_and_restores() {
        let mut graph = KnowledgeGraph::new("topic").with_noise_budget(0.3);
        graph.add_node(node("a", 0.9));
        graph.add_node(node("b", 0.2));
        graph
            .add_edge(Edge::new("a".into(), "b".into(), Relation::PartOf))
            .unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let back: KnowledgeGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary(), graph.summary());
        assert_eq!(back.noise_budget, 0.3);
        assert_eq!(back.version(), graph.version());
    }
}
