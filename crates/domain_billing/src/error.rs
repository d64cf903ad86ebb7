//! Billing domain errors

use thiserror::Error;

use core_kernel::MoneyError;

/// Errors that can occur in the billing domain
#[derive(Debug, Error, PartialEq)]
pub enum BillingError {
    #[error("Invalid {entity} transition from {from}: {reason}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        reason: String,
    },

    #[error("Reconciliation difference {difference} exceeds allowed {allowed}")]
    ToleranceExceeded {
        difference: String,
        allowed: String,
    },

    #[error("Nothing to adjust: difference is zero")]
    NothingToAdjust,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No debtors to distribute the payment across")]
    NoDistributionTargets,

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl BillingError {
    pub(crate) fn invalid(
        entity: &'static str,
        from: impl std::fmt::Debug,
        reason: impl Into<String>,
    ) -> Self {
        BillingError::InvalidTransition {
            entity,
            from: format!("{:?}", from),
            reason: reason.into(),
        }
    }
}
