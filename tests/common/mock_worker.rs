//! Mock workers for orchestration tests
//!
//! `ScriptedWorker` behaves like a small research team: mappers propose
//! claims with supporting entities, skeptics attach counter-studies,
//! scouts turn gaps into placeholders, linkers connect focus nodes and
//! auditors lower unsupported confidence. Output depends only on the
//! assignment and the snapshot, so runs are reproducible.

use async_trait::async_trait;
use penumbra::agent::{AgentRole, TaskAssignment, ToolBox, Worker, WorkerFailure};
use penumbra::graph::{Edge, EvidenceRef, KnowledgeGraph, Node, NodeKind, NodePatch, Relation};
use penumbra::DeltaProposal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Gap raised by every first-round mapper
pub const OPEN_QUESTION: &str = "long-term effect unknown";

pub struct ScriptedWorker {
    calls: AtomicUsize,
}

impl Default for ScriptedWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    /// Assignments run so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn map(&self, assignment: &TaskAssignment, topic: &str, tools: &ToolBox) -> DeltaProposal {
        let id = |suffix: &str| format!("{}-{}", assignment.id, suffix);
        let found = tools.search(topic).await.unwrap_or_default();

        let mut claim = Node::new(format!("{} claim", assignment.id), NodeKind::Claim)
            .with_id(id("claim").as_str())
            .with_confidence(0.8)
            .with_description(format!("Finding about {topic}"));
        for evidence in found.iter().take(2) {
            claim = claim.with_evidence(evidence.to_ref());
        }
        let entity = Node::new(format!("{} entity", assignment.id), NodeKind::Entity)
            .with_id(id("entity").as_str())
            .with_confidence(0.9)
            .with_evidence(EvidenceRef::new("registry", "named in the request"));
        let dataset = Node::new(format!("{} dataset", assignment.id), NodeKind::Dataset)
            .with_id(id("dataset").as_str())
            .with_confidence(0.6);

        let mut delta = DeltaProposal::new()
            .with_node(claim)
            .with_node(entity)
            .with_node(dataset)
            .with_edge(
                Edge::new(id("entity").as_str().into(), id("claim").as_str().into(), Relation::Supports)
                    .with_strength(0.7),
            )
            .with_edge(
                Edge::new(id("dataset").as_str().into(), id("claim").as_str().into(), Relation::Supports)
                    .with_strength(0.6),
            )
            .with_edge(
                Edge::new(
                    id("entity").as_str().into(),
                    id("dataset").as_str().into(),
                    Relation::CorrelatesWith,
                )
                .with_strength(0.55),
            );
        if assignment.round == 1 {
            delta = delta.with_gap(OPEN_QUESTION);
        }
        delta
    }

    fn challenge(&self, assignment: &TaskAssignment, snapshot: &KnowledgeGraph) -> DeltaProposal {
        let mut delta = DeltaProposal::new();
        for (n, claim_id) in assignment.focus.iter().take(4).enumerate() {
            let Some(claim) = snapshot.live_node(claim_id) else {
                continue;
            };
            let counter_id = format!("{}-counter{}", assignment.id, n);
            delta = delta
                .with_node(
                    Node::new(format!("Counter-study to {}", claim.label), NodeKind::Dataset)
                        .with_id(counter_id.as_str())
                        .with_confidence(0.4),
                )
                .with_edge(
                    Edge::new(counter_id.as_str().into(), claim.id.clone(), Relation::Contradicts)
                        .with_strength(0.5),
                );
        }
        delta
    }

    fn scout(&self, assignment: &TaskAssignment) -> DeltaProposal {
        let Some(gap) = &assignment.gap else {
            return DeltaProposal::new();
        };
        DeltaProposal::new()
            .with_node(
                Node::new(format!("Unknown: {gap}"), NodeKind::Placeholder)
                    .with_id(format!("{}-placeholder", assignment.id).as_str())
                    .with_confidence(0.2),
            )
            .resolving(gap.clone())
    }

    fn link(&self, assignment: &TaskAssignment) -> DeltaProposal {
        let focus = &assignment.focus;
        let mut delta = DeltaProposal::new();
        let mut added = 0;
        'outer: for step in 1..focus.len() {
            for i in 0..focus.len() - step {
                if added == 24 {
                    break 'outer;
                }
                delta = delta.with_edge(
                    Edge::new(focus[i].clone(), focus[i + step].clone(), Relation::SimilarTo)
                        .with_strength(0.65),
                );
                added += 1;
            }
        }
        delta
    }

    fn audit(&self, assignment: &TaskAssignment) -> DeltaProposal {
        assignment
            .focus
            .iter()
            .fold(DeltaProposal::new(), |delta, id| {
                delta.with_node_update(id.clone(), NodePatch::new().confidence(0.65))
            })
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn run(
        &self,
        assignment: &TaskAssignment,
        snapshot: Arc<KnowledgeGraph>,
        tools: &ToolBox,
    ) -> Result<DeltaProposal, WorkerFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match assignment.role {
            AgentRole::Mapper => self.map(assignment, &snapshot.topic, tools).await,
            AgentRole::Skeptic => self.challenge(assignment, &snapshot),
            AgentRole::PlaceholderScout => self.scout(assignment),
            AgentRole::Linker => self.link(assignment),
            AgentRole::EvidenceAuditor => self.audit(assignment),
        })
    }
}

/// Sleeps far past any test timeout before proposing a node, so its
/// output must never reach the graph
pub struct StallingWorker {
    delay: Duration,
}

impl StallingWorker {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Worker for StallingWorker {
    fn id(&self) -> &str {
        "stalling"
    }

    async fn run(
        &self,
        assignment: &TaskAssignment,
        _snapshot: Arc<KnowledgeGraph>,
        _tools: &ToolBox,
    ) -> Result<DeltaProposal, WorkerFailure> {
        tokio::time::sleep(self.delay).await;
        Ok(DeltaProposal::new().with_node(
            Node::new("late arrival", NodeKind::Entity).with_id(assignment.id.as_str()),
        ))
    }
}
