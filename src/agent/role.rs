//! Agent roles, task assignments and the per-round planner
//!
//! Planning is a pure function of the graph snapshot, the open gaps and the
//! effort profile: the same inputs always yield the same assignments, in
//! the same order, with the same identifiers.

use crate::allocator::EffortProfile;
use crate::graph::{KnowledgeGraph, Node, NodeId, NodeKind, Relation};
use crate::integrate::DeltaProposal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a worker is asked to do in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Propose entities, concepts and claims for the topic
    Mapper,
    /// Connect under-linked nodes
    Linker,
    /// Find counter-evidence for claims nobody has challenged
    Skeptic,
    /// Turn open gaps into placeholder nodes
    PlaceholderScout,
    /// Check confident nodes that cite no evidence
    EvidenceAuditor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mapper => "mapper",
            Self::Linker => "linker",
            Self::Skeptic => "skeptic",
            Self::PlaceholderScout => "placeholder_scout",
            Self::EvidenceAuditor => "evidence_auditor",
        }
    }

    /// The output contract every assignment of this role carries
    pub fn contract(&self) -> OutputContract {
        match self {
            Self::Mapper => OutputContract {
                max_new_nodes: 8,
                max_new_edges: 16,
                allowed_kinds: Vec::new(),
                allowed_relations: Vec::new(),
                may_update: false,
                may_remove: false,
            },
            Self::Linker => OutputContract {
                max_new_nodes: 0,
                max_new_edges: 24,
                allowed_kinds: Vec::new(),
                allowed_relations: Vec::new(),
                may_update: true,
                may_remove: false,
            },
            Self::Skeptic => OutputContract {
                max_new_nodes: 4,
                max_new_edges: 8,
                allowed_kinds: vec![NodeKind::Claim, NodeKind::Dataset, NodeKind::Placeholder],
                allowed_relations: vec![Relation::Contradicts, Relation::CorrelatesWith],
                may_update: true,
                may_remove: true,
            },
            Self::PlaceholderScout => OutputContract {
                max_new_nodes: 4,
                max_new_edges: 8,
                allowed_kinds: vec![NodeKind::Placeholder],
                allowed_relations: Vec::new(),
                may_update: false,
                may_remove: false,
            },
            Self::EvidenceAuditor => OutputContract {
                max_new_nodes: 0,
                max_new_edges: 0,
                allowed_kinds: Vec::new(),
                allowed_relations: Vec::new(),
                may_update: true,
                may_remove: false,
            },
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits on what one proposal may contain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    pub max_new_nodes: usize,
    pub max_new_edges: usize,
    /// Empty means any kind
    pub allowed_kinds: Vec<NodeKind>,
    /// Empty means any relation
    pub allowed_relations: Vec<Relation>,
    pub may_update: bool,
    pub may_remove: bool,
}

impl OutputContract {
    /// Check a proposal against the contract, describing the first breach
    pub fn check(&self, delta: &DeltaProposal) -> Result<(), String> {
        if delta.nodes.len() > self.max_new_nodes {
            return Err(format!(
                "{} new nodes exceeds limit of {}",
                delta.nodes.len(),
                self.max_new_nodes
            ));
        }
        if delta.edges.len() > self.max_new_edges {
            return Err(format!(
                "{} new edges exceeds limit of {}",
                delta.edges.len(),
                self.max_new_edges
            ));
        }
        if !self.allowed_kinds.is_empty() {
            if let Some(node) = delta.nodes.iter().find(|n| !self.allowed_kinds.contains(&n.kind)) {
                return Err(format!("node kind {} not allowed", node.kind.as_str()));
            }
        }
        if !self.allowed_relations.is_empty() {
            if let Some(edge) = delta
                .edges
                .iter()
                .find(|e| !self.allowed_relations.contains(&e.relation))
            {
                return Err(format!("relation {} not allowed", edge.relation));
            }
        }
        if !self.may_update && !delta.updates.is_empty() {
            return Err("updates not allowed".to_string());
        }
        if !self.may_remove && !delta.removals.is_empty() {
            return Err("removals not allowed".to_string());
        }
        Ok(())
    }
}

/// One unit of work handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Deterministic: `r{round}-{role}-{n}`
    pub id: String,
    pub round: u32,
    pub role: AgentRole,
    /// Higher applies first during integration
    pub priority: u8,
    pub instruction: String,
    pub contract: OutputContract,
    /// What the worker must stay inside
    pub boundary: String,
    /// When the worker should stop
    pub completion: String,
    /// Nodes the worker should concentrate on
    pub focus: Vec<NodeId>,
    /// The open gap this assignment targets, if any
    pub gap: Option<String>,
}

const SKEPTIC_FOCUS: usize = 5;
const SCOUT_GAPS: usize = 3;
const LINKER_FOCUS: usize = 8;
const AUDITOR_FOCUS: usize = 8;
const UNSUPPORTED_CONFIDENCE: f64 = 0.7;
const MAX_NEXT_ACTIONS: usize = 10;

/// Plan the assignments for one round.
///
/// Every role proposes candidates with a priority; the highest-priority
/// candidates fill the profile's worker slots and any slots left over go
/// to additional mappers.
pub fn plan_round(
    graph: &KnowledgeGraph,
    open_gaps: &[String],
    profile: &EffortProfile,
    round: u32,
) -> Vec<TaskAssignment> {
    let slots = profile.worker_count.max(1);
    let topic = graph.topic.as_str();
    let mut planner = Planner::new(round, topic);

    let empty = graph.node_count() == 0;
    planner.push(
        AgentRole::Mapper,
        if empty { 90 } else { 40 },
        format!("Map the main entities, concepts and claims for: {topic}"),
        Vec::new(),
        None,
    );

    let unchallenged = unchallenged_claims(graph);
    if !unchallenged.is_empty() {
        let focus: Vec<NodeId> = unchallenged
            .iter()
            .take(SKEPTIC_FOCUS)
            .map(|n| n.id.clone())
            .collect();
        let labels: Vec<&str> = unchallenged
            .iter()
            .take(SKEPTIC_FOCUS)
            .map(|n| n.label.as_str())
            .collect();
        planner.push(
            AgentRole::Skeptic,
            80,
            format!("Find counter-evidence for: {}", labels.join("; ")),
            focus,
            None,
        );
    }

    for gap in open_gaps.iter().take(SCOUT_GAPS) {
        planner.push(
            AgentRole::PlaceholderScout,
            70,
            format!("Represent the unresolved question as placeholders: {gap}"),
            Vec::new(),
            Some(gap.clone()),
        );
    }

    if graph.node_count() >= 2 && !graph.topology_met() {
        planner.push(
            AgentRole::Linker,
            60,
            format!(
                "Propose relations between under-connected nodes (edge/node ratio {:.2}, target {:.2})",
                graph.topology_ratio(),
                graph.topology_target
            ),
            least_connected(graph, LINKER_FOCUS),
            None,
        );
    }

    let unsupported = unsupported_nodes(graph);
    if !unsupported.is_empty() {
        planner.push(
            AgentRole::EvidenceAuditor,
            50,
            "Attach evidence or lower the confidence of unsupported nodes".to_string(),
            unsupported
                .iter()
                .take(AUDITOR_FOCUS)
                .map(|n| n.id.clone())
                .collect(),
            None,
        );
    }

    let mut assignments = planner.finish();
    assignments.sort_by(|a, b| b.priority.cmp(&a.priority));
    assignments.truncate(slots);

    let mut facet = 1;
    while assignments.len() < slots {
        let priority = 30u8.saturating_sub(facet as u8);
        let id = format!("r{round}-mapper-extra{facet}");
        assignments.push(assignment(
            id,
            round,
            AgentRole::Mapper,
            priority,
            format!("Map an additional facet ({facet}) of: {topic}"),
            Vec::new(),
            None,
        ));
        facet += 1;
    }
    assignments
}

/// Actionable follow-ups for the current graph, most urgent first
pub fn next_actions(graph: &KnowledgeGraph, open_gaps: &[String]) -> Vec<String> {
    let mut actions: Vec<String> = open_gaps
        .iter()
        .map(|gap| format!("Resolve open question: {gap}"))
        .collect();
    for claim in unchallenged_claims(graph) {
        actions.push(format!("Find counter-evidence for claim '{}'", claim.label));
    }
    if graph.node_count() >= 2 && !graph.topology_met() {
        actions.push(format!(
            "Link under-connected nodes (ratio {:.2} below {:.2})",
            graph.topology_ratio(),
            graph.topology_target
        ));
    }
    for node in unsupported_nodes(graph) {
        actions.push(format!("Gather evidence for '{}'", node.label));
    }
    actions.truncate(MAX_NEXT_ACTIONS);
    actions
}

/// Live claims with no contradiction from a non-placeholder node
fn unchallenged_claims(graph: &KnowledgeGraph) -> Vec<&Node> {
    graph
        .live_nodes_ordered()
        .into_iter()
        .filter(|n| n.kind == NodeKind::Claim)
        .filter(|claim| {
            !graph.incoming(&claim.id, Relation::Contradicts).any(|e| {
                graph
                    .live_node(&e.source)
                    .is_some_and(|s| s.kind != NodeKind::Placeholder)
            })
        })
        .collect()
}

/// Confident live nodes that cite no evidence
fn unsupported_nodes(graph: &KnowledgeGraph) -> Vec<&Node> {
    graph
        .live_nodes_ordered()
        .into_iter()
        .filter(|n| n.kind != NodeKind::Placeholder)
        .filter(|n| n.evidence.is_empty() && n.confidence > UNSUPPORTED_CONFIDENCE)
        .collect()
}

/// Lowest-degree live nodes, ties by insertion order
fn least_connected(graph: &KnowledgeGraph, limit: usize) -> Vec<NodeId> {
    let mut degree: HashMap<&NodeId, usize> = HashMap::new();
    for edge in graph.live_edges() {
        *degree.entry(&edge.source).or_default() += 1;
        *degree.entry(&edge.target).or_default() += 1;
    }
    let mut nodes = graph.live_nodes_ordered();
    // Stable sort keeps insertion order among equal degrees
    nodes.sort_by_key(|n| degree.get(&n.id).copied().unwrap_or(0));
    nodes.into_iter().take(limit).map(|n| n.id.clone()).collect()
}

struct Planner<'a> {
    round: u32,
    topic: &'a str,
    counts: HashMap<AgentRole, usize>,
    out: Vec<TaskAssignment>,
}

impl<'a> Planner<'a> {
    fn new(round: u32, topic: &'a str) -> Self {
        Self {
            round,
            topic,
            counts: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn push(
        &mut self,
        role: AgentRole,
        priority: u8,
        instruction: String,
        focus: Vec<NodeId>,
        gap: Option<String>,
    ) {
        let n = self.counts.entry(role).or_default();
        *n += 1;
        let id = format!("r{}-{}-{}", self.round, role, n);
        let mut task = assignment(id, self.round, role, priority, instruction, focus, gap);
        task.boundary = format!("{} Topic: {}", task.boundary, self.topic);
        self.out.push(task);
    }

    fn finish(self) -> Vec<TaskAssignment> {
        self.out
    }
}

fn assignment(
    id: String,
    round: u32,
    role: AgentRole,
    priority: u8,
    instruction: String,
    focus: Vec<NodeId>,
    gap: Option<String>,
) -> TaskAssignment {
    let contract = role.contract();
    let boundary = format!(
        "Propose at most {} nodes and {} edges; never edit the graph directly.",
        contract.max_new_nodes, contract.max_new_edges
    );
    let completion = match role {
        AgentRole::Mapper => "Stop once the core entities and claims are proposed.",
        AgentRole::Linker => "Stop once every focus node has at least one new relation.",
        AgentRole::Skeptic => "Stop once each focus claim has a counter-argument or is retired.",
        AgentRole::PlaceholderScout => "Stop once the question is represented in the graph.",
        AgentRole::EvidenceAuditor => "Stop once every focus node is supported or demoted.",
    };
    TaskAssignment {
        id,
        round,
        role,
        priority,
        instruction,
        contract,
        boundary,
        completion: completion.to_string(),
        focus,
        gap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::EffortTier;
    use crate::graph::{Edge, EvidenceRef};

    fn claim(id: &str, confidence: f64) -> Node {
        Node::new(format!("claim {id}"), NodeKind::Claim)
            .with_id(id)
            .with_confidence(confidence)
    }

    #[test]
    fn empty_graph_starts_with_a_mapper() {
        let graph = KnowledgeGraph::new("drug A vs drug B");
        let plan = plan_round(&graph, &[], &EffortTier::Simple.profile(), 1);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].role, AgentRole::Mapper);
        assert_eq!(plan[0].priority, 90);
        assert_eq!(plan[0].id, "r1-mapper-1");
    }

    #[test]
    fn slots_are_filled_to_worker_count() {
        let graph = KnowledgeGraph::new("t");
        let plan = plan_round(&graph, &[], &EffortTier::Complex.profile(), 1);
        assert_eq!(plan.len(), 7);
        assert!(plan.iter().all(|a| a.role == AgentRole::Mapper));
        let ids: std::collections::HashSet<_> = plan.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn unchallenged_claims_get_a_skeptic() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(claim("c1", 0.8));
        let plan = plan_round(&graph, &[], &EffortTier::Moderate.profile(), 2);
        assert_eq!(plan[0].role, AgentRole::Skeptic);
        assert_eq!(plan[0].focus, vec![NodeId::from("c1")]);
    }

    #[test]
    fn placeholder_falsifier_does_not_count_as_challenge() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(claim("c1", 0.8));
        graph.add_node(Node::new("maybe", NodeKind::Placeholder).with_id("p1"));
        graph
            .add_edge(Edge::new("p1".into(), "c1".into(), Relation::Contradicts))
            .unwrap();
        assert_eq!(unchallenged_claims(&graph).len(), 1);

        graph.add_node(Node::new("counter study", NodeKind::Dataset).with_id("d1"));
        graph
            .add_edge(Edge::new("d1".into(), "c1".into(), Relation::Contradicts))
            .unwrap();
        assert!(unchallenged_claims(&graph).is_empty());
    }

    #[test]
    fn open_gaps_get_scouts() {
        let graph = KnowledgeGraph::new("t");
        let gaps = vec!["dose unknown".to_string()];
        let plan = plan_round(&graph, &gaps, &EffortTier::Moderate.profile(), 1);
        let scout = plan
            .iter()
            .find(|a| a.role == AgentRole::PlaceholderScout)
            .unwrap();
        assert_eq!(scout.gap.as_deref(), Some("dose unknown"));
        assert_eq!(scout.contract.allowed_kinds, vec![NodeKind::Placeholder]);
    }

    #[test]
    fn sparse_graph_gets_a_linker() {
        let mut graph = KnowledgeGraph::new("t");
        for id in ["a", "b", "c"] {
            graph.add_node(Node::new(id, NodeKind::Entity).with_id(id));
        }
        graph
            .add_edge(Edge::new("a".into(), "b".into(), Relation::PartOf))
            .unwrap();
        let plan = plan_round(&graph, &[], &EffortTier::Complex.profile(), 1);
        let linker = plan.iter().find(|a| a.role == AgentRole::Linker).unwrap();
        // c has degree 0 and comes first
        assert_eq!(linker.focus[0], NodeId::from("c"));
    }

    #[test]
    fn planning_is_deterministic() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(claim("c1", 0.9));
        graph.add_node(claim("c2", 0.9));
        let gaps = vec!["g1".to_string(), "g2".to_string()];
        let profile = EffortTier::Complex.profile();
        let first = plan_round(&graph, &gaps, &profile, 3);
        assert_eq!(plan_round(&graph, &gaps, &profile, 3), first);
        // Priorities never increase along the plan
        assert!(first.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn contract_rejects_disallowed_content() {
        let linker = AgentRole::Linker.contract();
        let with_node = DeltaProposal::new().with_node(Node::new("x", NodeKind::Entity));
        assert!(linker.check(&with_node).is_err());

        let auditor = AgentRole::EvidenceAuditor.contract();
        let removal = DeltaProposal::new().with_node_removal("x");
        assert!(auditor.check(&removal).unwrap_err().contains("removals"));

        let skeptic = AgentRole::Skeptic.contract();
        let wrong_relation = DeltaProposal::new()
            .with_edge(Edge::new("a".into(), "b".into(), Relation::IsA));
        assert!(skeptic.check(&wrong_relation).is_err());
        assert!(skeptic.check(&DeltaProposal::new()).is_ok());
    }

    #[test]
    fn next_actions_cover_gaps_and_claims() {
        let mut graph = KnowledgeGraph::new("t");
        graph.add_node(claim("c1", 0.9).with_evidence(EvidenceRef::new("src", "")));
        let actions = next_actions(&graph, &["dose unknown".to_string()]);
        assert_eq!(actions[0], "Resolve open question: dose unknown");
        assert!(actions[1].contains("claim c1"));
    }
}
