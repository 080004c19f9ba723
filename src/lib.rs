//! Penumbra: Uncertainty-Preserving Knowledge-Graph Orchestrator
//!
//! Builds a graph of claims and relations through repeated rounds of
//! parallel worker tasks, while deliberately keeping a quota of
//! low-confidence and placeholder elements instead of collapsing to false
//! certainty. Every round is validated against the graph invariants, and
//! runs can be checkpointed and resumed.
//!
//! # Core Concepts
//!
//! - **Graph**: single-writer node/edge store with a noise budget and a topology target
//! - **Allocator**: scores a request into an effort tier (workers, calls, rounds)
//! - **Agents**: role-based assignments dispatched to a bounded worker pool
//! - **Integrator**: applies a round's proposals as one ordered batch
//! - **Validator**: repairs invariants and keeps an audit trail
//! - **Checkpoints**: condensed and full snapshots with lossy recovery
//!
//! # Example
//!
//! ```
//! use penumbra::{EffortTier, TaskAllocator};
//!
//! let allocation = TaskAllocator::default()
//!     .allocate("compare drug A and drug B mortality outcomes", None);
//! assert_eq!(allocation.tier, EffortTier::Moderate);
//! ```

pub mod agent;
pub mod allocator;
pub mod checkpoint;
pub mod config;
pub mod events;
pub mod graph;
pub mod integrate;
pub mod logging;
pub mod round;
pub mod storage;
pub mod validate;

pub use agent::{
    AgentRole, Evidence, EvidenceProvider, TaskAssignment, ToolBox, Worker, WorkerFailure,
    WorkerPool,
};
pub use allocator::{Allocation, EffortProfile, EffortTier, PriorContext, TaskAllocator};
pub use checkpoint::{CheckpointManager, LoadedCheckpoint, RoundState, SnapshotSource};
pub use config::{ConfigError, GraphSettings, OrchestratorConfig};
pub use events::{EventSink, LifecycleEvent};
pub use graph::{
    Edge, EdgeId, GraphError, GraphResult, KnowledgeGraph, Node, NodeId, NodeKind, Relation,
};
pub use integrate::{AnswerIntegrator, DeltaProposal, IntegrationReport};
pub use logging::init_logging;
pub use round::{Orchestrator, OrchestratorError, RoundPhase, SynthesisOutput};
pub use storage::{
    CheckpointStore, MemoryCheckpointStore, OpenStore, SqliteCheckpointStore, StorageError,
    StorageResult,
};
pub use validate::{AuditLog, Issue, SelfCorrectionValidator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
