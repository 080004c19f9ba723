//! Phases of the round state machine

use serde::{Deserialize, Serialize};

/// Where the orchestrator is in its cycle.
///
/// ```text
/// Init -> Strategy -> AllocateWorkers -> DispatchParallel -> Integrate
///      -> SelfCorrect -> {Checkpoint | Continue} -> ... -> Synthesize -> Complete
/// ```
///
/// `Error` is entered on overflow or an internal failure and always hands
/// over to `Checkpoint`, which recovers or forces a partial synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Init,
    Strategy,
    AllocateWorkers,
    DispatchParallel,
    Integrate,
    SelfCorrect,
    Checkpoint,
    Continue,
    Synthesize,
    Complete,
    Error,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Strategy => "strategy",
            Self::AllocateWorkers => "allocate_workers",
            Self::DispatchParallel => "dispatch_parallel",
            Self::Integrate => "integrate",
            Self::SelfCorrect => "self_correct",
            Self::Checkpoint => "checkpoint",
            Self::Continue => "continue",
            Self::Synthesize => "synthesize",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a run's phase trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Rounds completed when the phase was entered
    pub round: u32,
    pub phase: RoundPhase,
}
