//! WorkerPool: bounded parallel dispatch for one round
//!
//! Workers run concurrently (bounded by the effort profile's worker count),
//! each under its own timeout, and the whole round under a global deadline.
//! When the deadline passes, unfinished workers are aborted and reported as
//! timed out; their output, if any, is discarded. Results are returned in
//! dispatch order whatever order the workers finished in.

use super::cancel::CancellationToken;
use super::role::TaskAssignment;
use super::tools::{EvidenceProvider, ToolBox};
use super::worker::{Worker, WorkerFailure};
use crate::allocator::EffortProfile;
use crate::events::{emit, EventSink, LifecycleEvent, NullEventSink};
use crate::graph::KnowledgeGraph;
use crate::integrate::{DeltaProposal, ProposalEnvelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timeouts applied by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub worker_timeout_ms: u64,
    pub round_timeout_ms: u64,
    /// Upper bound on a single evidence search
    pub tool_call_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            worker_timeout_ms: 30_000,
            round_timeout_ms: 120_000,
            tool_call_timeout_ms: 10_000,
        }
    }
}

impl PoolSettings {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_call_timeout_ms)
    }
}

/// Outcome of one assignment
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub assignment: TaskAssignment,
    pub outcome: Result<DeltaProposal, WorkerFailure>,
    pub elapsed: Duration,
}

/// Everything the pool observed in one round
#[derive(Debug, Clone, Default)]
pub struct RoundDispatch {
    /// One report per assignment, in dispatch order
    pub reports: Vec<WorkerReport>,
    /// The global deadline passed before every worker finished
    pub round_timed_out: bool,
}

impl RoundDispatch {
    /// Successful proposals, attributed for integration
    pub fn proposals(&self) -> Vec<ProposalEnvelope> {
        self.reports
            .iter()
            .enumerate()
            .filter_map(|(index, report)| {
                report.outcome.as_ref().ok().map(|delta| {
                    ProposalEnvelope::new(
                        &report.assignment.id,
                        report.assignment.priority,
                        index,
                        delta.clone(),
                    )
                })
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TaskAssignment, &WorkerFailure)> {
        self.reports
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|f| (&r.assignment, f)))
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_ok()).count()
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct WorkerPool {
    worker: Arc<dyn Worker>,
    evidence: Option<Arc<dyn EvidenceProvider>>,
    events: Arc<dyn EventSink>,
    settings: PoolSettings,
}

impl WorkerPool {
    pub fn new(worker: Arc<dyn Worker>, settings: PoolSettings) -> Self {
        Self {
            worker,
            evidence: None,
            events: Arc::new(NullEventSink),
            settings,
        }
    }

    pub fn with_evidence(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.evidence = Some(provider);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Run every assignment against the same snapshot
    pub async fn dispatch(
        &self,
        round: u32,
        assignments: Vec<TaskAssignment>,
        snapshot: Arc<KnowledgeGraph>,
        profile: &EffortProfile,
    ) -> RoundDispatch {
        let count = assignments.len();
        if count == 0 {
            return RoundDispatch::default();
        }
        info!(round, workers = count, worker = self.worker.id(), "dispatching workers");

        let semaphore = Arc::new(Semaphore::new(profile.worker_count.max(1)));
        let cancel = CancellationToken::new();
        let worker_timeout = self.settings.worker_timeout();
        let deadline = Instant::now() + self.settings.round_timeout();
        let mut join_set = JoinSet::new();

        for (index, assignment) in assignments.iter().enumerate() {
            emit(
                self.events.as_ref(),
                LifecycleEvent::WorkerSpawned {
                    round,
                    assignment_id: assignment.id.clone(),
                    role: assignment.role.to_string(),
                },
            );
            let worker = self.worker.clone();
            let snapshot = snapshot.clone();
            let semaphore = semaphore.clone();
            let assignment = assignment.clone();
            let tools = ToolBox::new(
                self.evidence.clone(),
                profile.max_calls_per_worker,
                self.settings.tool_call_timeout(),
                cancel.clone(),
            );

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                // Inner task isolates panics; the guard aborts it if this
                // task is aborted or the timeout fires
                let mut task = AbortOnDrop(tokio::spawn(async move {
                    worker.run(&assignment, snapshot, &tools).await
                }));
                let outcome = match tokio::time::timeout(worker_timeout, &mut task.0).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(WorkerFailure::ToolError(format!(
                        "worker task failed: {join_error}"
                    ))),
                    Err(_) => Err(WorkerFailure::Timeout {
                        elapsed_ms: worker_timeout.as_millis() as u64,
                    }),
                };
                (index, outcome, started.elapsed())
            });
        }

        let mut slots: Vec<Option<(Result<DeltaProposal, WorkerFailure>, Duration)>> =
            (0..count).map(|_| None).collect();
        let mut round_timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((index, outcome, elapsed)))) => slots[index] = Some((outcome, elapsed)),
                Ok(Some(Err(join_error))) => {
                    warn!(round, error = %join_error, "worker supervisor task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    round_timed_out = true;
                    cancel.cancel();
                    join_set.shutdown().await;
                    warn!(
                        round,
                        timeout_ms = self.settings.round_timeout_ms,
                        "round deadline passed; aborting unfinished workers"
                    );
                    break;
                }
            }
        }

        let reports: Vec<WorkerReport> = assignments
            .into_iter()
            .zip(slots)
            .map(|(assignment, slot)| {
                let (outcome, elapsed) = match slot {
                    Some((Ok(delta), elapsed)) => {
                        let checked = assignment
                            .contract
                            .check(&delta)
                            .map(|()| delta)
                            .map_err(WorkerFailure::ContractViolation);
                        (checked, elapsed)
                    }
                    Some((Err(failure), elapsed)) => (Err(failure), elapsed),
                    None => (
                        Err(WorkerFailure::Timeout {
                            elapsed_ms: self.settings.round_timeout_ms,
                        }),
                        self.settings.round_timeout(),
                    ),
                };
                self.report_outcome(round, &assignment, &outcome, elapsed);
                WorkerReport {
                    assignment,
                    outcome,
                    elapsed,
                }
            })
            .collect();

        let dispatch = RoundDispatch {
            reports,
            round_timed_out,
        };
        debug!(
            round,
            succeeded = dispatch.succeeded(),
            failed = count - dispatch.succeeded(),
            "round dispatch finished"
        );
        dispatch
    }

    fn report_outcome(
        &self,
        round: u32,
        assignment: &TaskAssignment,
        outcome: &Result<DeltaProposal, WorkerFailure>,
        elapsed: Duration,
    ) {
        match outcome {
            Ok(_) => emit(
                self.events.as_ref(),
                LifecycleEvent::WorkerCompleted {
                    round,
                    assignment_id: assignment.id.clone(),
                    role: assignment.role.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                },
            ),
            Err(failure) => {
                warn!(
                    round,
                    assignment = %assignment.id,
                    role = %assignment.role,
                    error = %failure,
                    "worker failed"
                );
                emit(
                    self.events.as_ref(),
                    LifecycleEvent::WorkerFailed {
                        round,
                        assignment_id: assignment.id.clone(),
                        role: assignment.role.to_string(),
                        failure: failure.kind().to_string(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{plan_round, AgentRole};
    use crate::allocator::EffortTier;
    use crate::events::ChannelEventSink;
    use crate::graph::{Node, NodeKind};
    use async_trait::async_trait;

    /// Sleeps per role, then proposes one node named after the assignment
    struct TimedWorker {
        delay: fn(&TaskAssignment) -> Duration,
    }

    #[async_trait]
    impl Worker for TimedWorker {
        fn id(&self) -> &str {
            "timed"
        }

        async fn run(
            &self,
            assignment: &TaskAssignment,
            _snapshot: Arc<KnowledgeGraph>,
            _tools: &ToolBox,
        ) -> Result<DeltaProposal, WorkerFailure> {
            tokio::time::sleep((self.delay)(assignment)).await;
            if assignment.id.ends_with("extra3") {
                panic!("worker bug");
            }
            Ok(DeltaProposal::new().with_node(
                Node::new(assignment.id.clone(), NodeKind::Concept).with_id(assignment.id.as_str()),
            ))
        }
    }

    struct GreedyLinker;

    #[async_trait]
    impl Worker for GreedyLinker {
        fn id(&self) -> &str {
            "greedy"
        }

        async fn run(
            &self,
            _assignment: &TaskAssignment,
            _snapshot: Arc<KnowledgeGraph>,
            tools: &ToolBox,
        ) -> Result<DeltaProposal, WorkerFailure> {
            loop {
                tools.search("more").await?;
            }
        }
    }

    fn assignments(n: usize) -> (Vec<TaskAssignment>, EffortProfile) {
        let mut profile = EffortTier::Complex.profile();
        profile.worker_count = n;
        let graph = KnowledgeGraph::new("t");
        (plan_round(&graph, &[], &profile, 1), profile)
    }

    fn settings(worker_ms: u64, round_ms: u64) -> PoolSettings {
        PoolSettings {
            worker_timeout_ms: worker_ms,
            round_timeout_ms: round_ms,
            tool_call_timeout_ms: 1_000,
        }
    }

    fn snapshot() -> Arc<KnowledgeGraph> {
        Arc::new(KnowledgeGraph::new("t"))
    }

    #[tokio::test(start_paused = true)]
    async fn reports_follow_dispatch_order() {
        let (tasks, profile) = assignments(3);
        // Later assignments finish first
        let worker = TimedWorker {
            delay: |a| {
                if a.id.ends_with("mapper-1") {
                    Duration::from_secs(3)
                } else {
                    Duration::from_secs(1)
                }
            },
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(10_000, 60_000));
        let dispatch = pool.dispatch(1, tasks.clone(), snapshot(), &profile).await;

        assert!(!dispatch.round_timed_out);
        assert_eq!(dispatch.succeeded(), 3);
        let ids: Vec<_> = dispatch.reports.iter().map(|r| r.assignment.id.clone()).collect();
        let expected: Vec<_> = tasks.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, expected);
        let envelopes = dispatch.proposals();
        assert_eq!(envelopes[0].dispatch_index, 0);
        assert_eq!(envelopes[0].priority, tasks[0].priority);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_worker_times_out_alone() {
        let (tasks, profile) = assignments(2);
        let worker = TimedWorker {
            delay: |a| {
                if a.id.ends_with("extra1") {
                    Duration::from_secs(120)
                } else {
                    Duration::from_millis(10)
                }
            },
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(30_000, 600_000));
        let dispatch = pool.dispatch(1, tasks, snapshot(), &profile).await;

        assert!(dispatch.reports[0].outcome.is_ok());
        assert_eq!(
            dispatch.reports[1].outcome.as_ref().unwrap_err(),
            &WorkerFailure::Timeout { elapsed_ms: 30_000 }
        );
        assert!(!dispatch.round_timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn round_deadline_discards_unfinished_workers() {
        let (tasks, profile) = assignments(3);
        let worker = TimedWorker {
            delay: |_| Duration::from_secs(50),
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(100_000, 5_000));
        let dispatch = pool.dispatch(1, tasks, snapshot(), &profile).await;

        assert!(dispatch.round_timed_out);
        assert_eq!(dispatch.succeeded(), 0);
        assert!(dispatch.proposals().is_empty());
        assert!(dispatch
            .failures()
            .all(|(_, f)| matches!(f, WorkerFailure::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_becomes_tool_error() {
        let (tasks, profile) = assignments(4);
        let worker = TimedWorker {
            delay: |_| Duration::from_millis(1),
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(10_000, 60_000));
        let dispatch = pool.dispatch(1, tasks, snapshot(), &profile).await;

        assert_eq!(dispatch.succeeded(), 3);
        assert!(matches!(
            dispatch.reports[3].outcome,
            Err(WorkerFailure::ToolError(_))
        ));
    }

    #[tokio::test]
    async fn contract_breach_is_a_worker_failure() {
        let (mut tasks, profile) = assignments(1);
        tasks[0].role = AgentRole::Linker;
        tasks[0].contract = AgentRole::Linker.contract();
        let worker = TimedWorker {
            delay: |_| Duration::ZERO,
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(10_000, 60_000));
        let dispatch = pool.dispatch(1, tasks, snapshot(), &profile).await;

        assert!(matches!(
            dispatch.reports[0].outcome,
            Err(WorkerFailure::ContractViolation(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_tool_budget_fails_the_worker() {
        let (tasks, profile) = assignments(1);
        let pool = WorkerPool::new(Arc::new(GreedyLinker), settings(10_000, 60_000));
        let dispatch = pool.dispatch(1, tasks, snapshot(), &profile).await;

        let failure = dispatch.reports[0].outcome.as_ref().unwrap_err();
        assert!(failure.to_string().contains("budget"));
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let (tasks, profile) = assignments(2);
        let (sink, mut rx) = ChannelEventSink::new();
        let worker = TimedWorker {
            delay: |_| Duration::ZERO,
        };
        let pool = WorkerPool::new(Arc::new(worker), settings(10_000, 60_000))
            .with_event_sink(Arc::new(sink));
        pool.dispatch(1, tasks, snapshot(), &profile).await;

        let mut types = Vec::new();
        while let Ok((event_type, _)) = rx.try_recv() {
            types.push(event_type);
        }
        assert_eq!(types.iter().filter(|t| *t == "worker_spawned").count(), 2);
        assert_eq!(types.iter().filter(|t| *t == "worker_completed").count(), 2);
    }

    #[tokio::test]
    async fn no_assignments_is_an_empty_round() {
        let (_, profile) = assignments(1);
        let pool = WorkerPool::new(
            Arc::new(TimedWorker {
                delay: |_| Duration::ZERO,
            }),
            PoolSettings::default(),
        );
        let dispatch = pool.dispatch(1, Vec::new(), snapshot(), &profile).await;
        assert!(dispatch.reports.is_empty());
    }
}
