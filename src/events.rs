//! Lifecycle events and the fire-and-forget sink they are published to
//!
//! Events are advisory: publishing never gates control flow, and a sink
//! that is unavailable only costs observability.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A lifecycle event emitted by the orchestrator or worker pool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    RunStarted {
        topic: String,
        tier: String,
    },
    PhaseEntered {
        round: u32,
        phase: String,
    },
    WorkerSpawned {
        round: u32,
        assignment_id: String,
        role: String,
    },
    WorkerCompleted {
        round: u32,
        assignment_id: String,
        role: String,
        elapsed_ms: u64,
    },
    WorkerFailed {
        round: u32,
        assignment_id: String,
        role: String,
        failure: String,
    },
    RoundIntegrated {
        round: u32,
        changed: usize,
        rejected: usize,
    },
    CheckpointSaved {
        round: u32,
        checkpoint_id: String,
    },
    OverflowRecovered {
        round: u32,
        attempt: u32,
        nodes_dropped: usize,
        edges_dropped: usize,
    },
    RunFinished {
        rounds: u32,
        degraded: bool,
    },
}

impl LifecycleEvent {
    /// Stable event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::PhaseEntered { .. } => "phase_entered",
            Self::WorkerSpawned { .. } => "worker_spawned",
            Self::WorkerCompleted { .. } => "worker_completed",
            Self::WorkerFailed { .. } => "worker_failed",
            Self::RoundIntegrated { .. } => "round_integrated",
            Self::CheckpointSaved { .. } => "checkpoint_saved",
            Self::OverflowRecovered { .. } => "overflow_recovered",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    /// JSON payload (the event's fields, tagged with its type)
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The sink could not accept an event
#[derive(Debug, Error)]
#[error("event sink unavailable: {0}")]
pub struct SinkUnavailable(pub String);

/// Fire-and-forget destination for lifecycle events
pub trait EventSink: Send + Sync {
    fn publish(&self, event_type: &str, payload: Value) -> Result<(), SinkUnavailable>;
}

/// Publish an event, swallowing sink failures
pub fn emit(sink: &dyn EventSink, event: LifecycleEvent) {
    let event_type = event.event_type();
    if let Err(e) = sink.publish(event_type, event.payload()) {
        debug!(event_type, error = %e, "lifecycle event dropped");
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event_type: &str, _payload: Value) -> Result<(), SinkUnavailable> {
        Ok(())
    }
}

/// Bridges lifecycle events into `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event_type: &str, payload: Value) -> Result<(), SinkUnavailable> {
        info!(target: "penumbra::lifecycle", event_type, %payload);
        Ok(())
    }
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event_type: &str, payload: Value) -> Result<(), SinkUnavailable> {
        self.tx
            .send((event_type.to_string(), payload))
            .map_err(|_| SinkUnavailable("receiver dropped".to_string()))
    }
}
