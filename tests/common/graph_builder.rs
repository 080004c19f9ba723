//! Graph building utilities for integration tests

use penumbra::graph::{Edge, KnowledgeGraph, Mutation, Node, NodeId, NodeKind, Relation};
use rand::rngs::StdRng;
use rand::Rng;

/// `count` entities, all at the same confidence, no edges
pub fn confident_nodes(topic: &str, count: usize, confidence: f64) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new(topic);
    for i in 0..count {
        graph.add_node(
            Node::new(format!("entity {i}"), NodeKind::Entity)
                .with_id(format!("n{i}").as_str())
                .with_confidence(confidence),
        );
    }
    graph
}

/// A connected graph with exactly `nodes` nodes and `edges` edges.
///
/// Every fourth node is a confident claim and every fourth (offset two) a
/// weak concept; the rest are confident entities. Every third edge is weak.
/// Edges walk the node ring at increasing strides so no two share both
/// endpoints.
pub fn dense_graph(topic: &str, nodes: usize, edges: usize) -> KnowledgeGraph {
    assert!(nodes >= 2, "need at least two nodes");
    let mut graph = KnowledgeGraph::new(topic);
    for i in 0..nodes {
        let (kind, confidence) = match i % 4 {
            0 => (NodeKind::Claim, 0.85),
            2 => (NodeKind::Concept, 0.35),
            _ => (NodeKind::Entity, 0.9),
        };
        graph.add_node(
            Node::new(format!("node {i}"), kind)
                .with_id(format!("n{i}").as_str())
                .with_confidence(confidence),
        );
    }
    for j in 0..edges {
        let stride = 1 + j / nodes;
        let source = NodeId::from(format!("n{}", j % nodes).as_str());
        let target = NodeId::from(format!("n{}", (j % nodes + stride) % nodes).as_str());
        graph
            .add_edge(
                Edge::new(source, target, Relation::CorrelatesWith)
                    .with_strength(if j % 3 == 0 { 0.4 } else { 0.8 }),
            )
            .expect("endpoints exist");
    }
    graph
}

#[derive(Debug, Clone, Copy)]
pub struct RandomGraphConfig {
    pub nodes: usize,
    pub edges: usize,
    /// Chance that a node is a claim
    pub claim_ratio: f64,
    /// Chance that a node reuses an earlier label
    pub duplicate_ratio: f64,
    /// Chance that a node is tombstoned after its edges are added
    pub removal_ratio: f64,
}

impl Default for RandomGraphConfig {
    fn default() -> Self {
        Self {
            nodes: 20,
            edges: 40,
            claim_ratio: 0.3,
            duplicate_ratio: 0.15,
            removal_ratio: 0.1,
        }
    }
}

/// A messy graph: duplicate labels, unchallenged claims, confident
/// elements and edges left dangling by removed nodes
pub fn random_graph(rng: &mut StdRng, config: RandomGraphConfig) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new("randomized");
    let mut labels: Vec<String> = Vec::new();
    for i in 0..config.nodes {
        let label = if !labels.is_empty() && rng.gen_bool(config.duplicate_ratio) {
            labels[rng.gen_range(0..labels.len())].clone()
        } else {
            format!("label {i}")
        };
        labels.push(label.clone());
        let kind = if rng.gen_bool(config.claim_ratio) {
            NodeKind::Claim
        } else {
            NodeKind::Concept
        };
        graph.add_node(
            Node::new(label, kind)
                .with_id(format!("n{i}").as_str())
                .with_confidence(rng.gen_range(0.55..1.0)),
        );
    }

    if config.nodes >= 2 {
        for _ in 0..config.edges {
            let source = rng.gen_range(0..config.nodes);
            let mut target = rng.gen_range(0..config.nodes);
            if target == source {
                target = (source + 1) % config.nodes;
            }
            let relation = match rng.gen_range(0..4) {
                0 => Relation::Causes,
                1 => Relation::Supports,
                2 => Relation::PartOf,
                _ => Relation::SimilarTo,
            };
            graph
                .add_edge(
                    Edge::new(
                        format!("n{source}").as_str().into(),
                        format!("n{target}").as_str().into(),
                        relation,
                    )
                    .with_strength(rng.gen_range(0.55..1.0)),
                )
                .expect("endpoints exist");
        }
    }

    for i in 0..config.nodes {
        if rng.gen_bool(config.removal_ratio) {
            graph
                .mutate(Mutation::RemoveNode {
                    id: format!("n{i}").as_str().into(),
                })
                .expect("node is live");
        }
    }
    graph
}
