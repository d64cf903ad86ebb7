//! Operational Pipeline Domain
//!
//! A batch is the monthly submission of debtor records from a ceding branch.
//! This crate holds the batch state machine and the per-debtor underwriting
//! review that finalizes the money behind a batch.
//!
//! # Batch Lifecycle
//!
//! ```text
//! Uploaded -> Validated -> Matched -> Approved -> NotaIssued -> BranchConfirmed -> Paid -> Closed
//!                             \-> Rejected
//! Closed -> ReopenRequested -> Reopened -> Closed
//!                          \-> Closed (request declined)
//! ```
//!
//! Approval is operational only. Final exposure and premium come from the
//! debtor review, never from the raw upload totals.

pub mod batch;
pub mod debtor;
pub mod review;
pub mod error;

pub use batch::{Batch, BatchStatus, ReopenImpact, ReopenRequest, StatusChange};
pub use debtor::{Debtor, DebtorInvoiceStatus, DebtorReconStatus, UnderwritingDecision, UnderwritingStatus};
pub use review::{AcceptedDebtor, FinalAmounts, ReviewOutcome, ReviewProgress};
pub use error::BatchError;
