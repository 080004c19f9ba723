//! Audit trail of every automatic correction and recovery action

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RenameDuplicateLabel,
    TombstoneDanglingEdge,
    SynthesizeFalsifier,
    DemoteConfidence,
    DemoteStrength,
    RejectProposal,
    WorkerFailure,
    CompressGraph,
    EmergencyCheckpoint,
    RecoverCheckpoint,
    CompactTombstones,
    PartialSynthesis,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenameDuplicateLabel => "rename_duplicate_label",
            Self::TombstoneDanglingEdge => "tombstone_dangling_edge",
            Self::SynthesizeFalsifier => "synthesize_falsifier",
            Self::DemoteConfidence => "demote_confidence",
            Self::DemoteStrength => "demote_strength",
            Self::RejectProposal => "reject_proposal",
            Self::WorkerFailure => "worker_failure",
            Self::CompressGraph => "compress_graph",
            Self::EmergencyCheckpoint => "emergency_checkpoint",
            Self::RecoverCheckpoint => "recover_checkpoint",
            Self::CompactTombstones => "compact_tombstones",
            Self::PartialSynthesis => "partial_synthesis",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub round: u32,
    pub action: AuditAction,
    /// Identifier of the affected element, assignment or checkpoint
    pub target: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(round: u32, action: AuditAction, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            round,
            action,
            target: target.into(),
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

/// Append-only log of audit entries for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = AuditEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn of_action(&self, action: AuditAction) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.action == action)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_action() {
        let mut log = AuditLog::new();
        log.record(AuditEntry::new(1, AuditAction::DemoteConfidence, "n1", "noise budget"));
        log.record(AuditEntry::new(1, AuditAction::SynthesizeFalsifier, "c1", "unfalsified"));
        log.record(AuditEntry::new(2, AuditAction::DemoteConfidence, "n2", "noise budget"));
        assert_eq!(log.of_action(AuditAction::DemoteConfidence).count(), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&AuditAction::TombstoneDanglingEdge).unwrap();
        assert_eq!(json, "\"tombstone_dangling_edge\"");
    }
}
