//! Core graph data structures

mod edge;
mod mutation;
mod node;
mod store;


pub use edge::{Edge, EdgeId, Relation};
pub use mutation::{EdgePatch, Mutation, NodePatch};
pub use node::{EvidenceRef, MutationStatus, Node, NodeId, NodeKind, NodeMetadata, NOISE_THRESHOLD};
pub use store::{
    CompressionPolicy, DropReport, GraphError, GraphMetadata, GraphResult, GraphSummary,
    KnowledgeGraph, DEFAULT_NOISE_BUDGET, DEFAULT_TOPOLOGY_TARGET,
};
