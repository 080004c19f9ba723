//! SelfCorrectionValidator: restores graph invariants after integration
//!
//! Steps, always in this order:
//!
//! 1. Rename duplicate labels among live nodes (the first keeps its label)
//! 2. Tombstone edges with a tombstoned or missing endpoint
//! 3. Give every claim lacking one a placeholder falsifier with a
//!    `contradicts` edge
//! 4. Demote elements until the noise budget is met, least-evidenced and
//!    oldest first
//! 5. Report (never fix) a topology deficit
//!
//! A second pass over an already-valid graph makes no changes.

use super::audit::{AuditAction, AuditEntry, AuditLog};
use crate::graph::{
    Edge, EdgeId, EdgePatch, KnowledgeGraph, Mutation, Node, NodeId, NodeKind, NodePatch, Relation,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Values used when the validator synthesizes or demotes elements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub falsifier_confidence: f64,
    pub falsifier_strength: f64,
    /// Demoted elements are capped at this confidence/strength
    pub demotion_cap: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            falsifier_confidence: 0.2,
            falsifier_strength: 0.3,
            demotion_cap: 0.45,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    TopologyDeficit,
    OpenGap,
    WorkerFailure,
    RejectedMutation,
    RecoveryExhausted,
}

/// Something a reader of the result should know is unresolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub round: u32,
    pub detail: String,
}

impl Issue {
    pub fn new(kind: IssueKind, round: u32, detail: impl Into<String>) -> Self {
        Self {
            kind,
            round,
            detail: detail.into(),
        }
    }
}

/// What one validation pass did and found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub actions: Vec<AuditEntry>,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// True if the pass changed nothing
    pub fn is_clean(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.actions.iter().filter(|a| a.action == action).count()
    }
}

#[derive(Debug, Clone)]
enum Element {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelfCorrectionValidator {
    config: ValidatorConfig,
}

impl SelfCorrectionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run all steps, appending every action to `audit`
    pub fn validate(&self, graph: &mut KnowledgeGraph, audit: &mut AuditLog) -> ValidationReport {
        let round = graph.round;
        let mut report = ValidationReport::default();

        self.rename_duplicates(graph, &mut report);
        self.tombstone_dangling(graph, &mut report);
        self.ensure_falsifiers(graph, &mut report);
        self.enforce_noise_budget(graph, &mut report);

        if graph.node_count() > 0 && !graph.topology_met() {
            report.issues.push(Issue::new(
                IssueKind::TopologyDeficit,
                round,
                format!(
                    "edge/node ratio {:.2} below target {:.2}",
                    graph.topology_ratio(),
                    graph.topology_target
                ),
            ));
        }

        if report.is_clean() {
            debug!(round, "validation pass made no changes");
        } else {
            info!(
                round,
                renamed = report.count(AuditAction::RenameDuplicateLabel),
                tombstoned = report.count(AuditAction::TombstoneDanglingEdge),
                falsifiers = report.count(AuditAction::SynthesizeFalsifier),
                demoted = report.count(AuditAction::DemoteConfidence)
                    + report.count(AuditAction::DemoteStrength),
                "self-correction applied"
            );
        }
        audit.extend(report.actions.iter().cloned());
        report
    }

    fn rename_duplicates(&self, graph: &mut KnowledgeGraph, report: &mut ValidationReport) {
        let round = graph.round;
        let live: Vec<(NodeId, String)> = graph
            .live_nodes_ordered()
            .into_iter()
            .map(|n| (n.id.clone(), n.label.clone()))
            .collect();
        let mut taken: HashSet<String> = live.iter().map(|(_, label)| label.clone()).collect();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (id, label) in live {
            let count = seen.entry(label.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                continue;
            }
            let mut suffix = *count;
            let renamed = loop {
                let candidate = format!("{label} ({suffix})");
                if !taken.contains(&candidate) {
                    break candidate;
                }
                suffix += 1;
            };
            taken.insert(renamed.clone());
            let applied = graph.mutate(Mutation::UpdateNode {
                id: id.clone(),
                patch: NodePatch::new().label(renamed.clone()),
            });
            if applied.is_ok() {
                report.actions.push(AuditEntry::new(
                    round,
                    AuditAction::RenameDuplicateLabel,
                    id.as_str(),
                    format!("duplicate label '{label}' renamed to '{renamed}'"),
                ));
            }
        }
    }

    fn tombstone_dangling(&self, graph: &mut KnowledgeGraph, report: &mut ValidationReport) {
        let round = graph.round;
        let dangling: Vec<(EdgeId, NodeId)> = graph
            .live_edges()
            .filter_map(|e| {
                [&e.source, &e.target]
                    .into_iter()
                    .find(|endpoint| !graph.is_live_node(endpoint))
                    .map(|missing| (e.id.clone(), missing.clone()))
            })
            .collect();

        for (id, missing) in dangling {
            if graph.mutate(Mutation::RemoveEdge { id: id.clone() }).is_ok() {
                report.actions.push(AuditEntry::new(
                    round,
                    AuditAction::TombstoneDanglingEdge,
                    id.as_str(),
                    format!("endpoint {missing} is not live"),
                ));
            }
        }
    }

    fn ensure_falsifiers(&self, graph: &mut KnowledgeGraph, report: &mut ValidationReport) {
        let round = graph.round;
        let unfalsified: Vec<(NodeId, String)> = graph
            .live_nodes_ordered()
            .into_iter()
            .filter(|n| n.kind == NodeKind::Claim)
            .filter(|n| graph.incoming(&n.id, Relation::Contradicts).next().is_none())
            .map(|n| (n.id.clone(), n.label.clone()))
            .collect();
        if unfalsified.is_empty() {
            return;
        }

        let mut taken: HashSet<String> = graph.live_nodes().map(|n| n.label.clone()).collect();
        for (claim_id, claim_label) in unfalsified {
            let base = format!("Potential falsifier: {claim_label}");
            let mut label = base.clone();
            let mut suffix = 2;
            while taken.contains(&label) {
                label = format!("{base} ({suffix})");
                suffix += 1;
            }
            taken.insert(label.clone());

            let falsifier = Node::new(label, NodeKind::Placeholder)
                .with_confidence(self.config.falsifier_confidence)
                .with_description(format!(
                    "Unexamined evidence that could contradict '{claim_label}'"
                ));
            let falsifier_id = graph.add_node(falsifier);
            let edge = Edge::new(falsifier_id.clone(), claim_id.clone(), Relation::Contradicts)
                .with_strength(self.config.falsifier_strength)
                .with_description("synthesized falsifier");
            if graph.add_edge(edge).is_ok() {
                report.actions.push(AuditEntry::new(
                    round,
                    AuditAction::SynthesizeFalsifier,
                    claim_id.as_str(),
                    format!("claim had no contradicting edge; added {falsifier_id}"),
                ));
            }
        }
    }

    fn enforce_noise_budget(&self, graph: &mut KnowledgeGraph, report: &mut ValidationReport) {
        let round = graph.round;
        let total = graph.element_count();
        if total == 0 {
            return;
        }
        let required = required_noise(graph.noise_budget, total);
        let current = graph.noise_count();
        if current >= required {
            return;
        }
        let deficit = required - current;

        // (evidence count, insertion seq, element, current value)
        let mut candidates: Vec<(usize, u64, Element, f64)> = graph
            .live_nodes()
            .filter(|n| !n.is_noise())
            .map(|n| (n.evidence.len(), n.seq(), Element::Node(n.id.clone()), n.confidence))
            .chain(
                graph
                    .live_edges()
                    .filter(|e| !e.is_noise())
                    .map(|e| (e.evidence.len(), e.seq(), Element::Edge(e.id.clone()), e.strength)),
            )
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, _, element, value) in candidates.into_iter().take(deficit) {
            let demoted = value.min(self.config.demotion_cap);
            match element {
                Element::Node(id) => {
                    let applied = graph.mutate(Mutation::UpdateNode {
                        id: id.clone(),
                        patch: NodePatch::new().confidence(demoted),
                    });
                    if applied.is_ok() {
                        report.actions.push(AuditEntry::new(
                            round,
                            AuditAction::DemoteConfidence,
                            id.as_str(),
                            format!("noise budget: confidence {value:.2} -> {demoted:.2}"),
                        ));
                    }
                }
                Element::Edge(id) => {
                    let applied = graph.mutate(Mutation::UpdateEdge {
                        id: id.clone(),
                        patch: EdgePatch::new().strength(demoted),
                    });
                    if applied.is_ok() {
                        report.actions.push(AuditEntry::new(
                            round,
                            AuditAction::DemoteStrength,
                            id.as_str(),
                            format!("noise budget: strength {value:.2} -> {demoted:.2}"),
                        ));
                    }
                }
            }
        }
    }
}

/// Smallest element count at or below the noise threshold that meets the budget
fn required_noise(budget: f64, total: usize) -> usize {
    let exact = budget * total as f64;
    // Tolerate float error so that e.g. 0.25 * 8 stays 2
    (exact - 1e-9).ceil().max(0.0) as usize
}
