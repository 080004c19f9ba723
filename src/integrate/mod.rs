//! Round integration: worker proposals in, one ordered graph batch out

mod integrator;
mod proposal;
mod report;

pub use integrator::AnswerIntegrator;
pub use proposal::{DeltaProposal, ProposalEnvelope, ProposedRemoval, ProposedUpdate};
pub use report::{IntegrationReport, Rejection, RejectionReason};
