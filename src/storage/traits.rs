//! Storage trait definitions
//!
//! Checkpoint storage is a key-value store of immutable serialized records.
//! A checkpoint key is `{topic hash, round, timestamp}`; each key may hold one
//! record per `RecordKind`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stable hash of a topic, used to group its checkpoints
pub fn topic_hash(topic: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, topic.as_bytes())
        .simple()
        .to_string()
}

/// Identifier of one checkpoint (shared by its condensed and full records)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage key of one checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub topic_hash: String,
    pub round: u32,
    /// Microsecond precision
    pub timestamp: DateTime<Utc>,
}

impl CheckpointKey {
    pub fn new(topic_hash: impl Into<String>, round: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            topic_hash: topic_hash.into(),
            round,
            timestamp,
        }
    }

    /// `{topic_hash}-r{round}-{micros}`, unique per key
    pub fn id(&self) -> CheckpointId {
        CheckpointId(format!(
            "{}-r{:04}-{}",
            self.topic_hash,
            self.round,
            self.timestamp.timestamp_micros()
        ))
    }
}

/// Which representation a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Bounded summary; always written
    Condensed,
    /// Complete graph; best-effort
    Full,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Condensed => "condensed",
            Self::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "condensed" => Some(Self::Condensed),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Trait for checkpoint storage backends
///
/// Implementations must be thread-safe (Send + Sync): saves run on a
/// blocking thread while the round loop continues.
pub trait CheckpointStore: Send + Sync {
    /// Write a record. Records are immutable: writing an existing
    /// `(id, kind)` fails with `AlreadyExists`.
    fn put(&self, key: &CheckpointKey, kind: RecordKind, payload: &[u8]) -> StorageResult<()>;

    /// Read a record
    fn get(&self, id: &CheckpointId, kind: RecordKind) -> StorageResult<Option<Vec<u8>>>;

    /// Keys holding at least one record for the topic, newest first
    fn list(&self, topic_hash: &str) -> StorageResult<Vec<CheckpointKey>>;

    /// Delete every record of a checkpoint
    fn delete(&self, id: &CheckpointId) -> StorageResult<bool>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: CheckpointStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn topic_hash_is_stable() {
        assert_eq!(topic_hash("drug A vs B"), topic_hash("drug A vs B"));
        assert_ne!(topic_hash("drug A vs B"), topic_hash("drug A vs C"));
        assert_eq!(topic_hash("x").len(), 32);
    }

    #[test]
    fn key_id_encodes_round_and_time() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let key = CheckpointKey::new("abc", 7, ts);
        assert_eq!(
            key.id().as_str(),
            format!("abc-r0007-{}", ts.timestamp_micros())
        );
    }
}
