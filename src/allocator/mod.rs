//! Task allocation: request complexity scoring and effort scaling
//!
//! A pure, deterministic function from (request text, optional prior
//! context) to an effort profile. The same inputs always land in the same
//! tier, so allocation can be re-run on resume without drift.

mod effort;
mod scoring;

pub use effort::{EffortProfile, EffortTier};
pub use scoring::{Allocation, AllocatorConfig, PriorContext, TaskAllocator};
