//! Checkpointing: condensed and full snapshots of a run, and recovery from them

mod manager;
mod record;

pub use manager::{CheckpointManager, CheckpointSettings, LoadedCheckpoint, SnapshotSource};
pub use record::{
    CheckpointMetadata, CondensedEdge, CondensedNode, CondensedRecord, FullRecord, RoundState,
    CHECKPOINT_VERSION,
};
