//! AnswerIntegrator: applies a round's proposals as one ordered batch
//!
//! Proposals are ordered by assignment priority (highest first), ties broken
//! by dispatch position, so the outcome never depends on which worker
//! finished first. Within the batch every node addition is applied before
//! any edge addition, then updates, then removals. Each item is validated
//! on its own: a bad item is rejected, the rest of its proposal commits.

use super::proposal::{ProposalEnvelope, ProposedRemoval};
use super::report::{IntegrationReport, Rejection, RejectionReason};
use crate::graph::{GraphError, KnowledgeGraph, MutationStatus};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Merges worker proposals into the graph
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerIntegrator;

impl AnswerIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Apply all proposals from one round.
    ///
    /// Statuses are settled first so that after the call they describe
    /// exactly this batch.
    pub fn integrate(
        &self,
        graph: &mut KnowledgeGraph,
        mut proposals: Vec<ProposalEnvelope>,
    ) -> IntegrationReport {
        proposals.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.dispatch_index.cmp(&b.dispatch_index))
        });

        graph.settle();
        let mut report = IntegrationReport::default();
        let round = graph.round;

        // Node additions
        for proposal in &proposals {
            for node in &proposal.delta.nodes {
                if graph.node(&node.id).is_some() {
                    report.rejections.push(Rejection::new(
                        &proposal.assignment_id,
                        "add_node",
                        node.id.as_str(),
                        RejectionReason::DuplicateId,
                    ));
                    continue;
                }
                let mut node = node.clone();
                node.status = MutationStatus::New;
                node.metadata.round = Some(round);
                graph.add_node(node);
                report.nodes_added += 1;
            }
        }

        // Edge additions
        for proposal in &proposals {
            for edge in &proposal.delta.edges {
                let mut edge = edge.clone();
                edge.status = MutationStatus::New;
                match graph.add_edge(edge.clone()) {
                    Ok(_) => report.edges_added += 1,
                    Err(GraphError::DanglingReference { missing, .. }) => {
                        report.rejections.push(Rejection::new(
                            &proposal.assignment_id,
                            "add_edge",
                            edge.id.as_str(),
                            RejectionReason::DanglingReference { missing },
                        ));
                    }
                    Err(_) => {
                        report.rejections.push(Rejection::new(
                            &proposal.assignment_id,
                            "add_edge",
                            edge.id.as_str(),
                            RejectionReason::DuplicateId,
                        ));
                    }
                }
            }
        }

        // Updates: first (highest-priority) writer per target wins
        let mut updated_by: HashMap<String, String> = HashMap::new();
        for proposal in &proposals {
            for update in &proposal.delta.updates {
                let target = update.target();
                if let Some(winner) = updated_by.get(&target) {
                    report.rejections.push(Rejection::new(
                        &proposal.assignment_id,
                        update.clone().into_mutation().kind(),
                        target,
                        RejectionReason::Conflict {
                            winner: winner.clone(),
                        },
                    ));
                    continue;
                }
                let mutation = update.clone().into_mutation();
                let kind = mutation.kind();
                match graph.mutate(mutation) {
                    Ok(()) => {
                        report.updates_applied += 1;
                        updated_by.insert(target, proposal.assignment_id.clone());
                    }
                    Err(_) => report.rejections.push(Rejection::new(
                        &proposal.assignment_id,
                        kind,
                        target,
                        RejectionReason::UnknownTarget,
                    )),
                }
            }
        }

        // Removals
        for proposal in &proposals {
            for removal in &proposal.delta.removals {
                let target = removal.target();
                let kind = match removal {
                    ProposedRemoval::Node(_) => "remove_node",
                    ProposedRemoval::Edge(_) => "remove_edge",
                };
                match graph.mutate(removal.clone().into_mutation()) {
                    Ok(()) => report.removals_applied += 1,
                    Err(_) => report.rejections.push(Rejection::new(
                        &proposal.assignment_id,
                        kind,
                        target,
                        RejectionReason::UnknownTarget,
                    )),
                }
            }
        }

        let mut seen_gaps = HashSet::new();
        let mut seen_resolved = HashSet::new();
        for proposal in &proposals {
            for gap in &proposal.delta.gaps {
                if seen_gaps.insert(gap.clone()) {
                    report.gaps.push(gap.clone());
                }
            }
            for gap in &proposal.delta.resolved_gaps {
                if seen_resolved.insert(gap.clone()) {
                    report.resolved_gaps.push(gap.clone());
                }
            }
        }

        for rejection in &report.rejections {
            warn!(
                round,
                assignment = %rejection.assignment_id,
                mutation = %rejection.mutation,
                target = %rejection.target,
                reason = %rejection.reason,
                "proposed mutation rejected"
            );
        }
        debug!(
            round,
            nodes = report.nodes_added,
            edges = report.edges_added,
            updates = report.updates_applied,
            removals = report.removals_applied,
            rejected = report.rejections.len(),
            "integrated round"
        );

        report
    }
}
