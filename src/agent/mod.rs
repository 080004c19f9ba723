//! Research agents: roles, assignments, tools and the parallel worker pool
//!
//! ## Architecture
//!
//! - `role`: agent roles, output contracts and the pure round planner
//! - `worker`: the `Worker` trait agents implement
//! - `tools`: evidence search behind a per-worker call budget
//! - `pool`: bounded, time-limited parallel dispatch
//! - `cancel`: cooperative cancellation shared by a round's workers

mod cancel;
mod pool;
mod role;
mod tools;
mod worker;

pub use cancel::CancellationToken;
pub use pool::{PoolSettings, RoundDispatch, WorkerPool, WorkerReport};
pub use role::{next_actions, plan_round, AgentRole, OutputContract, TaskAssignment};
pub use tools::{Evidence, EvidenceError, EvidenceProvider, StaticEvidence, ToolBox};
pub use worker::{Worker, WorkerFailure};
