//! CheckpointManager: save, load, recover and prune checkpoints
//!
//! Every save writes a condensed record; a full snapshot is written
//! alongside when enabled, on a best-effort basis. Loading prefers the full
//! snapshot and falls back to the condensed record, which is rebuilt into a
//! graph and passed through the validator so the invariants hold again.

use super::record::{
    CheckpointMetadata, CondensedEdge, CondensedNode, CondensedRecord, FullRecord, FullRecordRef,
    RoundState, CHECKPOINT_VERSION,
};
use crate::config::GraphSettings;
use crate::graph::KnowledgeGraph;
use crate::storage::{
    topic_hash, CheckpointId, CheckpointKey, CheckpointStore, RecordKind, StorageError,
    StorageResult,
};
use crate::validate::{AuditEntry, AuditLog, SelfCorrectionValidator};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Checkpoint cadence, retention and condensed-record caps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Checkpoints kept per topic after pruning
    pub keep_latest: usize,
    pub max_nodes: usize,
    pub max_edges: usize,
    pub max_gaps: usize,
    /// Non-placeholder nodes below this confidence are left out of condensed records
    pub high_confidence: f64,
    /// Non-contradiction edges below this strength are left out of condensed records
    pub strong_edge: f64,
    /// Also write a full snapshot with every checkpoint
    pub full_snapshots: bool,
    /// Overrides the effort tier's checkpoint interval
    pub interval: Option<u32>,
    /// Write a final checkpoint before synthesis
    pub save_on_complete: bool,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            keep_latest: 5,
            max_nodes: 20,
            max_edges: 40,
            max_gaps: 10,
            high_confidence: 0.7,
            strong_edge: 0.6,
            full_snapshots: true,
            interval: None,
            save_on_complete: true,
        }
    }
}

/// Which record a loaded checkpoint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Full,
    Condensed,
}

/// A checkpoint rebuilt into a working graph
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub id: CheckpointId,
    pub source: SnapshotSource,
    pub graph: KnowledgeGraph,
    pub round: u32,
    pub total_rounds: u32,
    pub open_gaps: Vec<String>,
    pub next_actions: Vec<String>,
    /// Validator actions applied while rebuilding a condensed record
    pub repairs: Vec<AuditEntry>,
}

pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    settings: CheckpointSettings,
    graph_settings: GraphSettings,
    validator: SelfCorrectionValidator,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, settings: CheckpointSettings) -> Self {
        Self {
            store,
            settings,
            graph_settings: GraphSettings::default(),
            validator: SelfCorrectionValidator::default(),
        }
    }

    /// Budgets applied to graphs rebuilt from condensed records
    pub fn with_graph_settings(mut self, graph_settings: GraphSettings) -> Self {
        self.graph_settings = graph_settings;
        self
    }

    pub fn with_validator(mut self, validator: SelfCorrectionValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn settings(&self) -> &CheckpointSettings {
        &self.settings
    }

    /// Write a checkpoint of `graph` and prune older ones
    pub fn save(&self, graph: &KnowledgeGraph, state: &RoundState) -> StorageResult<CheckpointId> {
        let hash = topic_hash(&graph.topic);
        let key = CheckpointKey::new(hash.clone(), state.round, self.next_timestamp(&hash)?);
        let id = key.id();
        let metadata = CheckpointMetadata {
            version: CHECKPOINT_VERSION,
            id: id.clone(),
            topic: graph.topic.clone(),
            timestamp: key.timestamp,
            round: state.round,
            total_rounds: state.total_rounds,
        };

        let condensed = self.condense(graph, state, metadata.clone());
        let payload = serde_json::to_vec(&condensed)?;
        self.store.put(&key, RecordKind::Condensed, &payload)?;

        if self.settings.full_snapshots {
            let full = FullRecordRef {
                metadata: &metadata,
                graph,
                open_gaps: &state.open_gaps,
                next_actions: &state.next_actions,
            };
            let written = serde_json::to_vec(&full)
                .map_err(StorageError::from)
                .and_then(|bytes| self.store.put(&key, RecordKind::Full, &bytes));
            if let Err(e) = written {
                warn!(checkpoint = %id, error = %e, "full snapshot not written; condensed record only");
            }
        }

        info!(
            checkpoint = %id,
            round = state.round,
            nodes = condensed.nodes.len(),
            edges = condensed.edges.len(),
            "checkpoint saved"
        );

        if let Err(e) = self.prune(&hash) {
            warn!(checkpoint = %id, error = %e, "checkpoint pruning failed");
        }
        Ok(id)
    }

    /// Load a checkpoint, preferring its full snapshot
    pub fn load(&self, id: &CheckpointId) -> StorageResult<Option<LoadedCheckpoint>> {
        if let Some(bytes) = self.store.get(id, RecordKind::Full)? {
            match serde_json::from_slice::<FullRecord>(&bytes) {
                Ok(record) if record.metadata.version <= CHECKPOINT_VERSION => {
                    return Ok(Some(LoadedCheckpoint {
                        id: id.clone(),
                        source: SnapshotSource::Full,
                        round: record.metadata.round,
                        total_rounds: record.metadata.total_rounds,
                        graph: record.graph,
                        open_gaps: record.open_gaps,
                        next_actions: record.next_actions,
                        repairs: Vec::new(),
                    }));
                }
                Ok(record) => warn!(
                    checkpoint = %id,
                    version = record.metadata.version,
                    "full snapshot has unsupported version; using condensed record"
                ),
                Err(e) => warn!(
                    checkpoint = %id,
                    error = %e,
                    "full snapshot unreadable; using condensed record"
                ),
            }
        }
        self.load_condensed(id)
    }

    /// Load a checkpoint from its condensed record only
    pub fn load_condensed(&self, id: &CheckpointId) -> StorageResult<Option<LoadedCheckpoint>> {
        let Some(bytes) = self.store.get(id, RecordKind::Condensed)? else {
            return Ok(None);
        };
        let record: CondensedRecord = serde_json::from_slice(&bytes)?;
        if record.metadata.version > CHECKPOINT_VERSION {
            return Err(StorageError::Unavailable(format!(
                "checkpoint {} has unsupported format version {}",
                id, record.metadata.version
            )));
        }
        Ok(Some(self.reconstruct(id, record)))
    }

    /// Load the newest readable checkpoint for a topic
    pub fn recover_latest(&self, topic: &str) -> StorageResult<Option<LoadedCheckpoint>> {
        for key in self.store.list(&topic_hash(topic))? {
            let id = key.id();
            match self.load(&id) {
                Ok(Some(loaded)) => {
                    info!(
                        checkpoint = %id,
                        round = loaded.round,
                        source = ?loaded.source,
                        repairs = loaded.repairs.len(),
                        "recovered checkpoint"
                    );
                    return Ok(Some(loaded));
                }
                Ok(None) => continue,
                Err(StorageError::Serialization(e)) => {
                    warn!(checkpoint = %id, error = %e, "checkpoint unreadable; trying an older one");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Checkpoint keys for a topic, newest first
    pub fn list(&self, topic: &str) -> StorageResult<Vec<CheckpointKey>> {
        self.store.list(&topic_hash(topic))
    }

    /// Delete all but the newest `keep_latest` checkpoints of a topic
    fn prune(&self, hash: &str) -> StorageResult<usize> {
        let mut pruned = 0;
        for key in self.store.list(hash)?.into_iter().skip(self.settings.keep_latest) {
            if self.store.delete(&key.id())? {
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(topic_hash = hash, pruned, "pruned old checkpoints");
        }
        Ok(pruned)
    }

    fn condense(
        &self,
        graph: &KnowledgeGraph,
        state: &RoundState,
        metadata: CheckpointMetadata,
    ) -> CondensedRecord {
        let (nodes, edges) = graph.retention(
            self.settings.max_nodes,
            self.settings.max_edges,
            self.settings.high_confidence,
            self.settings.strong_edge,
        );
        CondensedRecord {
            metadata,
            summary: graph.summary(),
            nodes: nodes.into_iter().map(CondensedNode::from_node).collect(),
            edges: edges.into_iter().map(CondensedEdge::from_edge).collect(),
            open_gaps: state
                .open_gaps
                .iter()
                .take(self.settings.max_gaps)
                .cloned()
                .collect(),
            next_actions: state.next_actions.clone(),
        }
    }

    fn reconstruct(&self, id: &CheckpointId, record: CondensedRecord) -> LoadedCheckpoint {
        let mut graph = KnowledgeGraph::new(record.metadata.topic.clone())
            .with_noise_budget(self.graph_settings.noise_budget)
            .with_topology_target(self.graph_settings.topology_target);
        graph.round = record.metadata.round;

        for node in &record.nodes {
            graph.add_node(node.to_node());
        }
        for edge in &record.edges {
            if let Err(e) = graph.add_edge(edge.to_edge()) {
                warn!(checkpoint = %id, error = %e, "condensed edge dropped during rebuild");
            }
        }
        graph.settle();

        let mut audit = AuditLog::new();
        self.validator.validate(&mut graph, &mut audit);

        LoadedCheckpoint {
            id: id.clone(),
            source: SnapshotSource::Condensed,
            graph,
            round: record.metadata.round,
            total_rounds: record.metadata.total_rounds,
            open_gaps: record.open_gaps,
            next_actions: record.next_actions,
            repairs: audit.entries().to_vec(),
        }
    }

    /// Now at microsecond precision, strictly after the topic's newest key
    fn next_timestamp(&self, hash: &str) -> StorageResult<DateTime<Utc>> {
        let now = Utc::now();
        let now = now
            .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
            .unwrap_or(now);
        let latest = self.store.list(hash)?.into_iter().map(|k| k.timestamp).max();
        Ok(match latest {
            Some(latest) if latest >= now => latest + Duration::microseconds(1),
            _ => now,
        })
    }
}
