//! Orchestrator: the round coordinator
//!
//! Drives a run through `RoundPhase` as an explicit state machine. The
//! orchestrator is the only writer of the graph: workers see an `Arc`
//! snapshot taken before dispatch, and a round's proposals are integrated
//! as one batch once every worker has finished or timed out.
//!
//! Cadence checkpoints are written on a blocking task from a snapshot of
//! the validated graph, so they overlap the next round's dispatch. The save
//! is awaited before that round integrates, so a checkpoint never sees a
//! half-applied batch.

use super::output::{Degradation, OrchestratorError, SynthesisOutput};
use super::overflow::{ElementBudgetProbe, OverflowProbe};
use super::phase::{PhaseRecord, RoundPhase};
use crate::agent::{
    next_actions, plan_round, EvidenceProvider, RoundDispatch, TaskAssignment, Worker, WorkerPool,
};
use crate::allocator::{EffortProfile, EffortTier, PriorContext, TaskAllocator};
use crate::checkpoint::{CheckpointManager, RoundState};
use crate::config::OrchestratorConfig;
use crate::events::{emit, EventSink, LifecycleEvent, NullEventSink};
use crate::graph::{DropReport, KnowledgeGraph};
use crate::integrate::AnswerIntegrator;
use crate::storage::{CheckpointId, CheckpointStore, StorageResult};
use crate::validate::{AuditAction, AuditEntry, AuditLog, Issue, IssueKind, SelfCorrectionValidator};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: OrchestratorConfig,
    allocator: TaskAllocator,
    pool: WorkerPool,
    integrator: AnswerIntegrator,
    validator: SelfCorrectionValidator,
    checkpoints: Arc<CheckpointManager>,
    events: Arc<dyn EventSink>,
    probe: Arc<dyn OverflowProbe>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        worker: Arc<dyn Worker>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let validator = SelfCorrectionValidator::new(config.validator);
        let checkpoints = CheckpointManager::new(store, config.checkpoint)
            .with_graph_settings(config.graph)
            .with_validator(validator);
        Self {
            allocator: TaskAllocator::new(config.allocator.clone()),
            pool: WorkerPool::new(worker, config.pool),
            integrator: AnswerIntegrator::new(),
            validator,
            checkpoints: Arc::new(checkpoints),
            events: Arc::new(NullEventSink),
            probe: Arc::new(ElementBudgetProbe::new(config.overflow.max_live_elements)),
            config,
        }
    }

    pub fn with_evidence(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.pool = self.pool.with_evidence(provider);
        self
    }

    /// Lifecycle events from both the orchestrator and its worker pool
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.pool = self.pool.with_event_sink(sink.clone());
        self.events = sink;
        self
    }

    /// Replace the default live-element budget probe
    pub fn with_overflow_probe(mut self, probe: Arc<dyn OverflowProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run a request from an empty graph to synthesis
    pub async fn run(
        &self,
        request: &str,
        prior: Option<&PriorContext>,
    ) -> Result<SynthesisOutput, OrchestratorError> {
        let graph = KnowledgeGraph::new(request)
            .with_noise_budget(self.config.graph.noise_budget)
            .with_topology_target(self.config.graph.topology_target);
        self.drive(Run::new(graph, RoundPhase::Init), prior).await
    }

    /// Re-enter the state machine at `Strategy` from the newest checkpoint
    /// of `topic`
    pub async fn resume(&self, topic: &str) -> Result<SynthesisOutput, OrchestratorError> {
        let loaded = self
            .checkpoints
            .recover_latest(topic)?
            .ok_or_else(|| OrchestratorError::NoCheckpoint(topic.to_string()))?;
        info!(
            topic,
            checkpoint = %loaded.id,
            round = loaded.round,
            source = ?loaded.source,
            "resuming run"
        );

        let mut run = Run::new(loaded.graph, RoundPhase::Strategy);
        run.graph.round = loaded.round;
        run.open_gaps = loaded.open_gaps;
        run.last_saved_round = Some(loaded.round);
        run.audit.extend(loaded.repairs);
        run.audit.record(AuditEntry::new(
            loaded.round,
            AuditAction::RecoverCheckpoint,
            loaded.id.as_str(),
            format!("resumed from {:?} snapshot", loaded.source),
        ));
        self.drive(run, None).await
    }

    async fn drive(
        &self,
        mut run: Run,
        prior: Option<&PriorContext>,
    ) -> Result<SynthesisOutput, OrchestratorError> {
        loop {
            run.enter(self.events.as_ref());
            run.phase = match run.phase {
                RoundPhase::Init => self.init(&run),
                RoundPhase::Strategy => self.strategy(&mut run, prior),
                RoundPhase::AllocateWorkers => self.allocate_workers(&mut run),
                RoundPhase::DispatchParallel => self.dispatch(&mut run).await,
                RoundPhase::Integrate => self.integrate(&mut run).await?,
                RoundPhase::SelfCorrect => self.self_correct(&mut run),
                RoundPhase::Checkpoint => self.checkpoint(&mut run).await?,
                RoundPhase::Continue => RoundPhase::AllocateWorkers,
                RoundPhase::Error => self.error(&run),
                RoundPhase::Synthesize => self.synthesize(&mut run).await?,
                RoundPhase::Complete => return Ok(self.complete(run)),
            };
        }
    }

    // === Phases ===

    fn init(&self, run: &Run) -> RoundPhase {
        info!(
            topic = %run.graph.topic,
            noise_budget = run.graph.noise_budget,
            topology_target = run.graph.topology_target,
            "starting run"
        );
        RoundPhase::Strategy
    }

    fn strategy(&self, run: &mut Run, prior: Option<&PriorContext>) -> RoundPhase {
        let allocation = self.allocator.allocate(&run.graph.topic, prior);
        let mut profile = allocation.profile;
        if let Some(interval) = self.config.checkpoint.interval {
            profile = profile.with_checkpoint_interval(interval);
        }
        info!(
            tier = %allocation.tier,
            score = allocation.score,
            domains = ?allocation.domains,
            workers = profile.worker_count,
            max_rounds = profile.max_rounds,
            checkpoint_interval = profile.checkpoint_interval,
            "effort profile chosen"
        );
        emit(
            self.events.as_ref(),
            LifecycleEvent::RunStarted {
                topic: run.graph.topic.clone(),
                tier: allocation.tier.to_string(),
            },
        );
        run.tier = allocation.tier;
        run.profile = profile;

        if run.graph.round >= profile.max_rounds {
            info!(round = run.graph.round, "round budget already spent");
            RoundPhase::Synthesize
        } else {
            RoundPhase::AllocateWorkers
        }
    }

    fn allocate_workers(&self, run: &mut Run) -> RoundPhase {
        if let Some(overflow) = self.probe.check(&run.graph) {
            warn!(
                round = run.graph.round,
                observed = overflow.observed,
                limit = overflow.limit,
                "context overflow detected"
            );
            run.fault = Some(OrchestratorError::ContextOverflow {
                observed: overflow.observed,
                limit: overflow.limit,
            });
            return RoundPhase::Error;
        }

        run.graph.round += 1;
        let round = run.graph.round;
        run.assignments = plan_round(&run.graph, &run.open_gaps, &run.profile, round);
        debug!(
            round,
            assignments = ?run.assignments.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            "round planned"
        );
        RoundPhase::DispatchParallel
    }

    async fn dispatch(&self, run: &mut Run) -> RoundPhase {
        let round = run.graph.round;
        let snapshot = Arc::new(run.graph.clone());
        let assignments = std::mem::take(&mut run.assignments);
        let dispatch = self
            .pool
            .dispatch(round, assignments, snapshot, &run.profile)
            .await;

        for (assignment, failure) in dispatch.failures() {
            run.audit.record(AuditEntry::new(
                round,
                AuditAction::WorkerFailure,
                assignment.id.as_str(),
                failure.to_string(),
            ));
            run.issues.push(Issue::new(
                IssueKind::WorkerFailure,
                round,
                format!("{} ({}): {}", assignment.id, assignment.role, failure),
            ));
        }
        if dispatch.round_timed_out {
            warn!(
                round,
                completed = dispatch.succeeded(),
                "round timed out; integrating completed workers only"
            );
        }
        run.dispatch = Some(dispatch);
        RoundPhase::Integrate
    }

    async fn integrate(&self, run: &mut Run) -> Result<RoundPhase, OrchestratorError> {
        if let Err(e) = self.await_pending_save(run).await {
            return absorb(run, e);
        }

        let round = run.graph.round;
        let proposals = run
            .dispatch
            .take()
            .map(|d| d.proposals())
            .unwrap_or_default();
        let report = self.integrator.integrate(&mut run.graph, proposals);

        for rejection in &report.rejections {
            run.audit.record(AuditEntry::new(
                round,
                AuditAction::RejectProposal,
                rejection.target.as_str(),
                format!(
                    "{} from {}: {}",
                    rejection.mutation, rejection.assignment_id, rejection.reason
                ),
            ));
            run.issues.push(Issue::new(
                IssueKind::RejectedMutation,
                round,
                format!(
                    "{} {} from {}: {}",
                    rejection.mutation, rejection.target, rejection.assignment_id, rejection.reason
                ),
            ));
        }
        for gap in &report.gaps {
            if !run.open_gaps.contains(gap) {
                run.open_gaps.push(gap.clone());
            }
        }
        run.open_gaps.retain(|g| !report.resolved_gaps.contains(g));
        run.changed = report.changed();

        emit(
            self.events.as_ref(),
            LifecycleEvent::RoundIntegrated {
                round,
                changed: report.changed(),
                rejected: report.rejections.len(),
            },
        );
        info!(
            round,
            changed = report.changed(),
            rejected = report.rejections.len(),
            open_gaps = run.open_gaps.len(),
            "round integrated"
        );
        Ok(RoundPhase::SelfCorrect)
    }

    fn self_correct(&self, run: &mut Run) -> RoundPhase {
        let round = run.graph.round;
        let report = self.validator.validate(&mut run.graph, &mut run.audit);
        run.structural = report.issues;

        let unfinished = !run.graph.noise_budget_met()
            || !run.graph.topology_met()
            || !run.open_gaps.is_empty();
        let proceed = round < run.profile.max_rounds && unfinished && run.changed > 0;
        debug!(
            round,
            proceed,
            unfinished,
            changed = run.changed,
            topology = run.graph.topology_ratio(),
            noise = run.graph.noise_ratio(),
            "continue decision"
        );

        let next = if proceed {
            RoundPhase::Continue
        } else {
            RoundPhase::Synthesize
        };
        if run.profile.is_checkpoint_round(round) {
            run.after_checkpoint = if proceed {
                RoundPhase::AllocateWorkers
            } else {
                RoundPhase::Synthesize
            };
            RoundPhase::Checkpoint
        } else {
            next
        }
    }

    async fn checkpoint(&self, run: &mut Run) -> Result<RoundPhase, OrchestratorError> {
        if let Some(fault) = run.fault.take() {
            return self.recover(run, fault).await;
        }
        if let Err(e) = self.await_pending_save(run).await {
            return absorb(run, e);
        }

        let round = run.graph.round;
        run.pending_save = Some(PendingSave {
            round,
            handle: self.spawn_save(run),
        });
        debug!(round, "cadence checkpoint started");
        Ok(run.after_checkpoint)
    }

    fn error(&self, run: &Run) -> RoundPhase {
        match &run.fault {
            Some(fault) => warn!(round = run.graph.round, error = %fault, "entering recovery"),
            None => warn!(round = run.graph.round, "error phase entered without a fault"),
        }
        RoundPhase::Checkpoint
    }

    async fn synthesize(&self, run: &mut Run) -> Result<RoundPhase, OrchestratorError> {
        if let Err(e) = self.await_pending_save(run).await {
            return absorb(run, e);
        }

        let round = run.graph.round;
        let dropped = run.graph.compact();
        if dropped != DropReport::default() {
            run.audit.record(AuditEntry::new(
                round,
                AuditAction::CompactTombstones,
                run.graph.topic.as_str(),
                format!(
                    "dropped {} tombstoned nodes and {} tombstoned edges",
                    dropped.nodes_dropped, dropped.edges_dropped
                ),
            ));
        }

        if self.config.checkpoint.save_on_complete && run.last_saved_round != Some(round) {
            if let Err(e) = self.save_now(run).await {
                // A degraded run has no recovery left to route into
                if run.degradation.is_some() {
                    return Err(e);
                }
                return absorb(run, e);
            }
        }
        Ok(RoundPhase::Complete)
    }

    fn complete(&self, run: Run) -> SynthesisOutput {
        let round = run.graph.round;
        let mut unresolved = run.issues;
        unresolved.extend(run.structural);
        unresolved.extend(
            run.open_gaps
                .iter()
                .map(|gap| Issue::new(IssueKind::OpenGap, round, gap.clone())),
        );
        if let Some(degradation) = &run.degradation {
            unresolved.push(Issue::new(
                IssueKind::RecoveryExhausted,
                round,
                degradation.reason.clone(),
            ));
        }

        let summary = run.graph.summary();
        emit(
            self.events.as_ref(),
            LifecycleEvent::RunFinished {
                rounds: round,
                degraded: run.degradation.is_some(),
            },
        );
        info!(
            rounds = round,
            nodes = summary.node_count,
            edges = summary.edge_count,
            degraded = run.degradation.is_some(),
            unresolved = unresolved.len(),
            "run complete"
        );

        SynthesisOutput {
            topic: run.graph.topic.clone(),
            tier: run.tier,
            rounds_completed: round,
            next_actions: next_actions(&run.graph, &run.open_gaps),
            summary,
            graph: run.graph,
            degradation: run.degradation,
            unresolved_issues: unresolved,
            open_gaps: run.open_gaps,
            audit: run.audit,
            checkpoints: run.checkpoints,
            trace: run.trace,
        }
    }

    // === Recovery ===

    /// Handle a fault recorded by an earlier phase.
    ///
    /// Overflow: emergency checkpoint, in-place compression, and a fresh
    /// round. Anything else: reload the newest checkpoint. Once the attempt
    /// budget is spent, synthesize whatever the graph holds.
    async fn recover(
        &self,
        run: &mut Run,
        fault: OrchestratorError,
    ) -> Result<RoundPhase, OrchestratorError> {
        match self.await_pending_save(run).await {
            Ok(()) => {}
            Err(OrchestratorError::Internal(reason)) => {
                warn!(reason = %reason, "checkpoint in flight was lost");
            }
            Err(e) => return Err(e),
        }

        let round = run.graph.round;
        if run.recoveries >= self.config.overflow.max_attempts {
            return Ok(self.degrade(run, fault.to_string()));
        }
        run.recoveries += 1;
        let attempt = run.recoveries;

        match fault {
            OrchestratorError::ContextOverflow { observed, limit } => {
                let id = match self.save_now(run).await {
                    Ok(id) => id,
                    Err(e) => return absorb(run, e),
                };
                run.audit.record(AuditEntry::new(
                    round,
                    AuditAction::EmergencyCheckpoint,
                    id.as_str(),
                    format!("{observed} live elements over limit {limit}"),
                ));

                let dropped = run.graph.compress(&self.config.overflow.compression);
                run.audit.record(AuditEntry::new(
                    round,
                    AuditAction::CompressGraph,
                    run.graph.topic.as_str(),
                    format!(
                        "dropped {} nodes and {} edges",
                        dropped.nodes_dropped, dropped.edges_dropped
                    ),
                ));
                run.structural = self.validator.validate(&mut run.graph, &mut run.audit).issues;

                emit(
                    self.events.as_ref(),
                    LifecycleEvent::OverflowRecovered {
                        round,
                        attempt,
                        nodes_dropped: dropped.nodes_dropped,
                        edges_dropped: dropped.edges_dropped,
                    },
                );
                info!(
                    round,
                    attempt,
                    checkpoint = %id,
                    nodes_dropped = dropped.nodes_dropped,
                    edges_dropped = dropped.edges_dropped,
                    live = run.graph.element_count(),
                    "recovered from overflow by compression"
                );
                Ok(RoundPhase::AllocateWorkers)
            }
            other => match self.checkpoints.recover_latest(&run.graph.topic)? {
                Some(loaded) => {
                    info!(
                        round,
                        attempt,
                        checkpoint = %loaded.id,
                        restored_round = loaded.round,
                        "recovered from checkpoint"
                    );
                    run.audit.extend(loaded.repairs);
                    run.audit.record(AuditEntry::new(
                        loaded.round,
                        AuditAction::RecoverCheckpoint,
                        loaded.id.as_str(),
                        format!("recovered after: {other}"),
                    ));
                    run.graph = loaded.graph;
                    run.graph.round = loaded.round;
                    run.open_gaps = loaded.open_gaps;
                    run.last_saved_round = Some(loaded.round);
                    Ok(RoundPhase::AllocateWorkers)
                }
                None => Ok(self.degrade(run, format!("{other}; no checkpoint to recover from"))),
            },
        }
    }

    fn degrade(&self, run: &mut Run, reason: String) -> RoundPhase {
        let round = run.graph.round;
        warn!(
            round,
            attempts = run.recoveries,
            reason = %reason,
            "recovery exhausted; synthesizing from partial graph"
        );
        run.audit.record(AuditEntry::new(
            round,
            AuditAction::PartialSynthesis,
            run.graph.topic.as_str(),
            reason.clone(),
        ));
        run.degradation = Some(Degradation {
            reason,
            attempts: run.recoveries,
        });
        RoundPhase::Synthesize
    }

    // === Checkpoint plumbing ===

    fn spawn_save(&self, run: &Run) -> JoinHandle<StorageResult<CheckpointId>> {
        let manager = self.checkpoints.clone();
        let graph = run.graph.clone();
        let state = run.round_state();
        tokio::task::spawn_blocking(move || manager.save(&graph, &state))
    }

    async fn save_now(&self, run: &mut Run) -> Result<CheckpointId, OrchestratorError> {
        let round = run.graph.round;
        let id = self
            .spawn_save(run)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("checkpoint task failed: {e}")))??;
        self.saved(run, round, id.clone());
        Ok(id)
    }

    /// Wait for an in-flight cadence checkpoint, if any
    async fn await_pending_save(&self, run: &mut Run) -> Result<(), OrchestratorError> {
        let Some(pending) = run.pending_save.take() else {
            return Ok(());
        };
        let id = pending
            .handle
            .await
            .map_err(|e| OrchestratorError::Internal(format!("checkpoint task failed: {e}")))??;
        self.saved(run, pending.round, id);
        Ok(())
    }

    fn saved(&self, run: &mut Run, round: u32, id: CheckpointId) {
        emit(
            self.events.as_ref(),
            LifecycleEvent::CheckpointSaved {
                round,
                checkpoint_id: id.to_string(),
            },
        );
        run.last_saved_round = Some(round);
        run.checkpoints.push(id);
    }
}

/// Route recoverable errors into the `Error` phase; everything else
/// propagates
fn absorb(run: &mut Run, error: OrchestratorError) -> Result<RoundPhase, OrchestratorError> {
    match error {
        OrchestratorError::ContextOverflow { .. } | OrchestratorError::Internal(_) => {
            run.fault = Some(error);
            Ok(RoundPhase::Error)
        }
        other => Err(other),
    }
}

struct PendingSave {
    round: u32,
    handle: JoinHandle<StorageResult<CheckpointId>>,
}

/// Mutable state of one run, owned by the driving loop
struct Run {
    graph: KnowledgeGraph,
    phase: RoundPhase,
    tier: EffortTier,
    profile: EffortProfile,
    open_gaps: Vec<String>,
    audit: AuditLog,
    /// Worker failures and rejections, accumulated over the run
    issues: Vec<Issue>,
    /// Findings of the latest validation pass
    structural: Vec<Issue>,
    assignments: Vec<TaskAssignment>,
    dispatch: Option<RoundDispatch>,
    /// Mutations committed by the latest integration
    changed: usize,
    after_checkpoint: RoundPhase,
    pending_save: Option<PendingSave>,
    last_saved_round: Option<u32>,
    checkpoints: Vec<CheckpointId>,
    fault: Option<OrchestratorError>,
    recoveries: u32,
    degradation: Option<Degradation>,
    trace: Vec<PhaseRecord>,
}

impl Run {
    fn new(graph: KnowledgeGraph, phase: RoundPhase) -> Self {
        let profile = EffortTier::Simple.profile();
        Self {
            graph,
            phase,
            tier: profile.tier,
            profile,
            open_gaps: Vec::new(),
            audit: AuditLog::new(),
            issues: Vec::new(),
            structural: Vec::new(),
            assignments: Vec::new(),
            dispatch: None,
            changed: 0,
            after_checkpoint: RoundPhase::AllocateWorkers,
            pending_save: None,
            last_saved_round: None,
            checkpoints: Vec::new(),
            fault: None,
            recoveries: 0,
            degradation: None,
            trace: Vec::new(),
        }
    }

    fn enter(&mut self, events: &dyn EventSink) {
        let round = self.graph.round;
        self.trace.push(PhaseRecord {
            round,
            phase: self.phase,
        });
        debug!(round, phase = %self.phase, "entering phase");
        emit(
            events,
            LifecycleEvent::PhaseEntered {
                round,
                phase: self.phase.to_string(),
            },
        );
    }

    fn round_state(&self) -> RoundState {
        RoundState {
            round: self.graph.round,
            total_rounds: self.profile.max_rounds,
            open_gaps: self.open_gaps.clone(),
            next_actions: next_actions(&self.graph, &self.open_gaps),
        }
    }
}
