//! In-memory checkpoint store backed by a concurrent map

use super::traits::{
    CheckpointId, CheckpointKey, CheckpointStore, OpenStore, RecordKind, StorageError,
    StorageResult,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: DashMap<(CheckpointId, RecordKind), (CheckpointKey, Vec<u8>)>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (all kinds)
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl OpenStore for MemoryCheckpointStore {
    /// Paths are ignored: the store never touches disk
    fn open(_path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn put(&self, key: &CheckpointKey, kind: RecordKind, payload: &[u8]) -> StorageResult<()> {
        let id = key.id();
        match self.records.entry((id.clone(), kind)) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(format!("{}/{}", id, kind.as_str()))),
            Entry::Vacant(slot) => {
                slot.insert((key.clone(), payload.to_vec()));
                Ok(())
            }
        }
    }

    fn get(&self, id: &CheckpointId, kind: RecordKind) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .records
            .get(&(id.clone(), kind))
            .map(|record| record.value().1.clone()))
    }

    fn list(&self, topic_hash: &str) -> StorageResult<Vec<CheckpointKey>> {
        let mut seen = HashSet::new();
        let mut keys: Vec<CheckpointKey> = self
            .records
            .iter()
            .filter(|record| record.value().0.topic_hash == topic_hash)
            .filter(|record| seen.insert(record.key().0.clone()))
            .map(|record| record.value().0.clone())
            .collect();
        keys.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.round.cmp(&a.round))
        });
        Ok(keys)
    }

    fn delete(&self, id: &CheckpointId) -> StorageResult<bool> {
        let mut removed = false;
        for kind in [RecordKind::Condensed, RecordKind::Full] {
            removed |= self.records.remove(&(id.clone(), kind)).is_some();
        }
        Ok(removed)
    }
}
