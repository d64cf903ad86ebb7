//! Batch domain errors

use thiserror::Error;

use core_kernel::MoneyError;
use crate::batch::BatchStatus;

/// Errors that can occur in the batch domain
#[derive(Debug, Error, PartialEq)]
pub enum BatchError {
    #[error("Invalid batch transition from {from:?}: {reason}")]
    InvalidTransition { from: BatchStatus, reason: String },

    #[error("Gate not satisfied: {0}")]
    GateNotSatisfied(String),

    #[error("{0} debtor(s) still pending underwriting review")]
    PendingReviewExists(usize),

    #[error("A reason is required to {0}")]
    MissingReason(&'static str),

    #[error("Batch is operationally locked")]
    OperationallyLocked,

    #[error("Debtor already decided: {0:?}")]
    AlreadyDecided(crate::debtor::UnderwritingStatus),

    #[error("Only rejected debtors can be revised")]
    NotRevisable,

    #[error("Final amounts have not been computed by debtor review")]
    FinalAmountsMissing,

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl BatchError {
    pub(crate) fn invalid(from: BatchStatus, reason: impl Into<String>) -> Self {
        BatchError::InvalidTransition {
            from,
            reason: reason.into(),
        }
    }
}
