//! Overflow detection: deciding when the working graph has outgrown its budget

use crate::graph::{CompressionPolicy, KnowledgeGraph};
use serde::{Deserialize, Serialize};

/// Limits for overflow detection and recovery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverflowSettings {
    /// Live nodes plus live edges tolerated before a round starts
    pub max_live_elements: usize,
    /// Recoveries (overflow or failure) attempted before a partial synthesis
    pub max_attempts: u32,
    pub compression: CompressionPolicy,
}

impl Default for OverflowSettings {
    fn default() -> Self {
        Self {
            max_live_elements: 400,
            max_attempts: 2,
            compression: CompressionPolicy::default(),
        }
    }
}

/// A detected overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overflow {
    pub observed: usize,
    pub limit: usize,
}

/// Checked before every round; `Some` sends the machine into recovery
pub trait OverflowProbe: Send + Sync {
    fn check(&self, graph: &KnowledgeGraph) -> Option<Overflow>;
}

impl<F> OverflowProbe for F
where
    F: Fn(&KnowledgeGraph) -> Option<Overflow> + Send + Sync,
{
    fn check(&self, graph: &KnowledgeGraph) -> Option<Overflow> {
        self(graph)
    }
}

/// Signals overflow when live elements exceed a fixed budget
#[derive(Debug, Clone, Copy)]
pub struct ElementBudgetProbe {
    max_live_elements: usize,
}

impl ElementBudgetProbe {
    pub fn new(max_live_elements: usize) -> Self {
        Self { max_live_elements }
    }
}

impl OverflowProbe for ElementBudgetProbe {
    fn check(&self, graph: &KnowledgeGraph) -> Option<Overflow> {
        let observed = graph.element_count();
        (observed > self.max_live_elements).then_some(Overflow {
            observed,
            limit: self.max_live_elements,
        })
    }
}

/// Never signals overflow
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverflow;

impl OverflowProbe for NoOverflow {
    fn check(&self, _graph: &KnowledgeGraph) -> Option<Overflow> {
        None
    }
}
