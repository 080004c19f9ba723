//! Self-correction: invariant repair after each integration, with audit trail

mod audit;
mod validator;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use validator::{Issue, IssueKind, SelfCorrectionValidator, ValidationReport, ValidatorConfig};
