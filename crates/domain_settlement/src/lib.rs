//! Settlement Orchestration
//!
//! Every workflow call enters through [`SettlementService`]. A call:
//!
//! 1. checks the actor's permission for the action,
//! 2. takes the per-aggregate lock (batch, nota or claim),
//! 3. re-reads the entities its guards depend on,
//! 4. applies the transition, or a saga of idempotent steps when several
//!    entities change,
//! 5. appends an audit entry and sends notifications, both best-effort.
//!
//! Blocked attempts are audited as carefully as successful ones.
//!
//! # Settlement cascade
//!
//! Marking a nota paid, matching a payment that covers an invoice and
//! closing a reconciliation item all run the same saga:
//!
//! ```text
//! invoice paid -> settlement payment (once) -> reconciliation closed
//!     -> debtors settled -> batch Paid -> claim settled -> nota Paid
//! ```
//!
//! The nota moves last, so a failure part-way leaves it unpaid and a retry
//! converges on the same end state.

pub mod config;
pub mod error;
pub mod permissions;
pub mod locks;
pub mod saga;
pub mod store;
pub mod audit;
pub mod notify;
pub mod service;
pub mod batch_flow;
pub mod review_flow;
pub mod nota_flow;
pub mod cascade;
pub mod reconcile_flow;
pub mod adjustment_flow;
pub mod claim_flow;
pub mod queries;

pub use config::SettlementConfig;
pub use error::{InvalidTransition, WorkflowError};
pub use permissions::{can, Action};
pub use locks::AggregateLocks;
pub use saga::{SagaExecutor, SagaReport, Step, StepOutcome};
pub use store::Stores;
pub use audit::{AuditEntry, AuditOutcome, AuditRecorder, AuditTrail};
pub use notify::{Notification, NotificationDispatcher, Notifier, Severity, TemplatedEmail};
pub use service::SettlementService;
pub use batch_flow::{BatchIntake, DebtorRecord};
pub use review_flow::{BulkDecision, BulkDecisionReport};
pub use cascade::SettlementTrigger;
pub use reconcile_flow::{AutoMatchReport, PaymentReceipt};
