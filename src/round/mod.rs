//! Round coordination: the orchestrator state machine and its outputs
//!
//! ## Architecture
//!
//! - `phase`: the `RoundPhase` states and the phase trace
//! - `orchestrator`: the driving loop and every phase transition
//! - `overflow`: overflow probes and recovery limits
//! - `output`: `SynthesisOutput` and `OrchestratorError`

mod orchestrator;
mod output;
mod overflow;
mod phase;

pub use orchestrator::Orchestrator;
pub use output::{Degradation, OrchestratorError, SynthesisOutput};
pub use overflow::{ElementBudgetProbe, NoOverflow, Overflow, OverflowProbe, OverflowSettings};
pub use phase::{PhaseRecord, RoundPhase};
