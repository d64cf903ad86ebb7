//! Workflow errors
//!
//! Every blocking condition is recoverable by fixing the underlying data and
//! retrying. Audit and notification failures never surface here.

use std::fmt;

use thiserror::Error;

use core_kernel::{MoneyError, PortError, Role};
use domain_batch::BatchError;
use domain_billing::BillingError;
use domain_claims::ClaimError;

use crate::permissions::Action;

/// Why a transition was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidTransition {
    /// The state machine has no such edge from the current state
    State {
        entity: &'static str,
        from: String,
        reason: String,
    },
    /// The actor's role may not perform the action
    RoleNotPermitted { role: Role, action: Action },
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidTransition::State { entity, from, reason } => {
                write!(f, "{} in state {}: {}", entity, from, reason)
            }
            InvalidTransition::RoleNotPermitted { role, action } => {
                write!(f, "role {} may not perform {}", role, action)
            }
        }
    }
}

/// Errors returned by the settlement orchestrator
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Gate not satisfied: {0}")]
    GateNotSatisfied(String),

    #[error("{0} debtor(s) still pending underwriting review")]
    PendingReviewExists(usize),

    #[error("Invalid transition: {0}")]
    InvalidTransition(InvalidTransition),

    #[error("Reconciliation difference {difference} exceeds allowed {allowed}")]
    ToleranceExceeded { difference: String, allowed: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(PortError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl WorkflowError {
    pub fn gate(reason: impl Into<String>) -> Self {
        WorkflowError::GateNotSatisfied(reason.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }

    pub fn invalid_state(
        entity: &'static str,
        from: impl fmt::Debug,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::InvalidTransition(InvalidTransition::State {
            entity,
            from: format!("{:?}", from),
            reason: reason.into(),
        })
    }

    pub fn role_not_permitted(role: Role, action: Action) -> Self {
        WorkflowError::InvalidTransition(InvalidTransition::RoleNotPermitted { role, action })
    }

    pub fn is_role_denied(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition(InvalidTransition::RoleNotPermitted { .. })
        )
    }

    /// Lost version races and transient store failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Store(e) => e.is_conflict() || e.is_transient(),
            _ => false,
        }
    }
}

impl From<PortError> for WorkflowError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => {
                WorkflowError::NotFound(format!("{} {}", entity_type, id))
            }
            PortError::Validation { message } => WorkflowError::Validation(message),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<BatchError> for WorkflowError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::InvalidTransition { from, reason } => {
                WorkflowError::invalid_state("Batch", from, reason)
            }
            BatchError::GateNotSatisfied(reason) => WorkflowError::GateNotSatisfied(reason),
            BatchError::PendingReviewExists(count) => WorkflowError::PendingReviewExists(count),
            BatchError::MissingReason(what) => {
                WorkflowError::Validation(format!("a reason is required to {}", what))
            }
            BatchError::OperationallyLocked => {
                WorkflowError::gate("batch is operationally locked")
            }
            BatchError::AlreadyDecided(status) => {
                WorkflowError::invalid_state("Debtor", status, "underwriting already decided")
            }
            BatchError::NotRevisable => {
                WorkflowError::InvalidTransition(InvalidTransition::State {
                    entity: "Debtor",
                    from: "not Rejected".to_string(),
                    reason: "only rejected debtors can be revised".to_string(),
                })
            }
            BatchError::FinalAmountsMissing => WorkflowError::gate("final amounts not computed"),
            BatchError::Money(e) => WorkflowError::Money(e),
        }
    }
}

impl From<BillingError> for WorkflowError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidTransition { entity, from, reason } => {
                WorkflowError::InvalidTransition(InvalidTransition::State { entity, from, reason })
            }
            BillingError::ToleranceExceeded { difference, allowed } => {
                WorkflowError::ToleranceExceeded { difference, allowed }
            }
            BillingError::NothingToAdjust => {
                WorkflowError::gate("nothing to adjust: reconciliation difference is zero")
            }
            BillingError::InvalidAmount(message) => WorkflowError::Validation(message),
            BillingError::NoDistributionTargets => {
                WorkflowError::gate("no approved debtors to distribute the payment across")
            }
            BillingError::Money(e) => WorkflowError::Money(e),
        }
    }
}

impl From<ClaimError> for WorkflowError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::InvalidStatusTransition { from, to } => {
                WorkflowError::InvalidTransition(InvalidTransition::State {
                    entity: "Claim",
                    from,
                    reason: format!("cannot move to {}", to),
                })
            }
            ClaimError::Blocked(reason) => WorkflowError::GateNotSatisfied(reason),
            ClaimError::InvalidAmount(message) => WorkflowError::Validation(message),
            ClaimError::MissingReason => {
                WorkflowError::validation("a reason is required to reject a claim")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_batch::BatchStatus;

    #[test]
    fn test_batch_gate_maps_to_gate() {
        let err: WorkflowError = BatchError::GateNotSatisfied("review".into()).into();
        assert!(matches!(err, WorkflowError::GateNotSatisfied(_)));

        let err: WorkflowError = BatchError::FinalAmountsMissing.into();
        assert_eq!(err.to_string(), "Gate not satisfied: final amounts not computed");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: WorkflowError = PortError::not_found("Batch", "BAT-1").into();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflicts_are_retryable() {
        let err: WorkflowError = PortError::conflict("stale version").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err: WorkflowError = BatchError::InvalidTransition {
            from: BatchStatus::Closed,
            reason: "no successor state".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid transition: Batch in state Closed: no successor state"
        );

        let denied = WorkflowError::role_not_permitted(Role::Counterparty, Action::BatchAdvance);
        assert!(denied.is_role_denied());
        assert!(denied.to_string().contains("counterparty"));
    }
}
