//! Claims domain errors

use thiserror::Error;

/// Errors that can occur in the claims domain
#[derive(Debug, Error, PartialEq)]
pub enum ClaimError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Claim blocked: {0}")]
    Blocked(String),

    #[error("Invalid claim amount: {0}")]
    InvalidAmount(String),

    #[error("A reason is required to reject a claim")]
    MissingReason,
}
