//! Claims Domain
//!
//! A claim is raised against a debtor of a batch. It may only be submitted
//! once the batch has actually been paid for, which the claim gate checks
//! against the batch's notas.
//!
//! # Claim Lifecycle
//!
//! ```text
//! Draft -> Submitted -> Approved -> Settled
//!                   \-> Rejected
//! ```
//!
//! Approval raises a claim nota; the claim settles when that nota is paid.

pub mod claim;
pub mod gate;
pub mod error;

pub use claim::{Claim, ClaimStatus};
pub use gate::{can_submit_claim, ensure_claim_submittable};
pub use error::ClaimError;
