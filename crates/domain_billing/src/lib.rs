//! Billing Domain - Settlement Instruments and Reconciliation
//!
//! Financial instruments that follow an approved batch or an approved claim:
//!
//! ```text
//! Nota:          Draft -> Issued -> Confirmed -> Paid
//! PaymentIntent: Draft -> Submitted -> Approved -> Completed
//!                                  \-> Rejected
//! DN/CN:         Draft -> UnderReview -> Approved -> Acknowledged
//!                                     \-> Rejected
//! ```
//!
//! Reconciliation compares a Batch-type Nota against the payments matched to
//! it. A difference inside the tolerance band reconciles; anything larger is
//! an exception that may be resolved with a debit or credit note. Notes are
//! an overlay: the Nota amount itself is never rewritten.

pub mod nota;
pub mod invoice;
pub mod payment_intent;
pub mod payment;
pub mod reconciliation;
pub mod adjustment;
pub mod error;

pub use nota::{Nota, NotaReference, NotaStatus, NotaType};
pub use invoice::{Invoice, InvoiceStatus};
pub use payment_intent::{IntentStatus, PaymentIntent, PaymentType};
pub use payment::{ExceptionType, MatchStatus, Payment, PaymentSource};
pub use reconciliation::{
    distribute, select_intent, DebtorShare, ReconciliationItem, ReconciliationRecord,
    ReconciliationStatus, TolerancePolicy,
};
pub use adjustment::{AdjustmentStatus, DebitCreditNote, NoteType};
pub use error::BillingError;
