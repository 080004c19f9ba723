//! Checkpoint storage backends
//!
//! Backends implement the `CheckpointStore` trait. `SqliteCheckpointStore`
//! persists to disk; `MemoryCheckpointStore` serves tests and ephemeral runs.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{
    topic_hash, CheckpointId, CheckpointKey, CheckpointStore, OpenStore, RecordKind,
    StorageError, StorageResult,
};
