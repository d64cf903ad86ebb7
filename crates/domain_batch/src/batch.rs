//! Batch aggregate
//!
//! # Invariants
//!
//! - The main pipeline only moves forward, one successor at a time
//! - Entering `NotaIssued` requires `batch_ready_for_nota`, a flag written
//!   exclusively by debtor review
//! - `Rejected` is reachable only from `Matched` and needs a reason
//! - `Closed` sets an operational lock; financial work continues under it
//! - Final amounts, once set, are never overwritten here

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, BatchId, ContractId, Currency, Entity, Money};

use crate::error::BatchError;
use crate::review::ReviewOutcome;

/// Batch lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Uploaded,
    Validated,
    Matched,
    Approved,
    NotaIssued,
    BranchConfirmed,
    Paid,
    Closed,
    /// Terminal failure, reachable from `Matched` only
    Rejected,
    /// Post-close exception path awaiting an elevated decision
    ReopenRequested,
    /// Correction window for previously rejected debtors
    Reopened,
}

impl BatchStatus {
    const PIPELINE: [BatchStatus; 8] = [
        BatchStatus::Uploaded,
        BatchStatus::Validated,
        BatchStatus::Matched,
        BatchStatus::Approved,
        BatchStatus::NotaIssued,
        BatchStatus::BranchConfirmed,
        BatchStatus::Paid,
        BatchStatus::Closed,
    ];

    /// The next state reachable by a plain `advance`
    pub fn successor(&self) -> Option<BatchStatus> {
        use BatchStatus::*;
        match self {
            Uploaded => Some(Validated),
            Validated => Some(Matched),
            Matched => Some(Approved),
            Approved => Some(NotaIssued),
            NotaIssued => Some(BranchConfirmed),
            BranchConfirmed => Some(Paid),
            Paid => Some(Closed),
            Reopened => Some(Closed),
            Closed | Rejected | ReopenRequested => None,
        }
    }

    /// Position on the main pipeline, `None` for side branches
    pub fn pipeline_position(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| s == self)
    }

    /// True when this status is `target` or lies beyond it on the pipeline.
    /// Reopen states count as having passed every pipeline stage.
    pub fn has_reached(&self, target: BatchStatus) -> bool {
        match (self.pipeline_position(), target.pipeline_position()) {
            (Some(current), Some(wanted)) => current >= wanted,
            _ => matches!(
                self,
                BatchStatus::ReopenRequested | BatchStatus::Reopened
            ) && target.pipeline_position().is_some(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Uploaded => "Uploaded",
            BatchStatus::Validated => "Validated",
            BatchStatus::Matched => "Matched",
            BatchStatus::Approved => "Approved",
            BatchStatus::NotaIssued => "NotaIssued",
            BatchStatus::BranchConfirmed => "BranchConfirmed",
            BatchStatus::Paid => "Paid",
            BatchStatus::Closed => "Closed",
            BatchStatus::Rejected => "Rejected",
            BatchStatus::ReopenRequested => "ReopenRequested",
            BatchStatus::Reopened => "Reopened",
        }
    }
}

/// Why a closed batch needs to be reopened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReopenImpact {
    /// Correction of debtors rejected during review
    DebtorCorrection,
    /// Missing or wrong supporting documents
    Documentation,
    /// Anything else; still limited to debtor correction once reopened
    Other,
}

/// A pending or resolved reopen request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenRequest {
    pub reason: String,
    pub impact: ReopenImpact,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub approved: Option<bool>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// One entry of the batch's transition history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: BatchStatus,
    pub to: BatchStatus,
    pub actor_email: String,
    pub actor_role: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// A monthly batch of debtor records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub batch_number: String,
    pub contract_id: ContractId,
    pub contract_reference: String,
    pub month: u32,
    pub year: i32,
    pub currency: Currency,
    pub status: BatchStatus,
    /// Raw totals from upload; informational only
    pub total_exposure: Money,
    pub total_premium: Money,
    /// Set by debtor review only
    pub final_exposure_amount: Option<Money>,
    pub final_premium_amount: Option<Money>,
    pub operational_locked: bool,
    pub debtor_review_completed: bool,
    pub batch_ready_for_nota: bool,
    pub rejection_reason: Option<String>,
    pub reopen_request: Option<ReopenRequest>,
    pub history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Batch {
    type Id = BatchId;
    const KIND: &'static str = "Batch";

    fn id(&self) -> BatchId {
        self.id
    }
}

impl Batch {
    /// Creates a freshly uploaded batch
    pub fn uploaded(
        contract_id: ContractId,
        contract_reference: impl Into<String>,
        month: u32,
        year: i32,
        currency: Currency,
        uploaded_by: &Actor,
    ) -> Self {
        let now = Utc::now();
        let id = BatchId::new_v7();
        let contract_reference = contract_reference.into();

        Self {
            id,
            batch_number: format!("BATCH-{}-{:04}{:02}", contract_reference, year, month),
            contract_id,
            contract_reference,
            month,
            year,
            currency,
            status: BatchStatus::Uploaded,
            total_exposure: Money::zero(currency),
            total_premium: Money::zero(currency),
            final_exposure_amount: None,
            final_premium_amount: None,
            operational_locked: false,
            debtor_review_completed: false,
            batch_ready_for_nota: false,
            rejection_reason: None,
            reopen_request: None,
            history: Vec::new(),
            created_by: uploaded_by.email.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the raw upload totals
    pub fn with_raw_totals(mut self, exposure: Money, premium: Money) -> Self {
        self.total_exposure = exposure;
        self.total_premium = premium;
        self
    }

    /// Moves the batch to its successor state
    ///
    /// Closing goes through [`Batch::close`], which needs the debtor review
    /// count. Entering `NotaIssued` requires the review gate.
    pub fn advance(&mut self, actor: &Actor) -> Result<BatchStatus, BatchError> {
        let next = self
            .status
            .successor()
            .ok_or_else(|| BatchError::invalid(self.status, "no successor state"))?;

        if next == BatchStatus::Closed {
            return Err(BatchError::invalid(
                self.status,
                "closing requires the debtor review check",
            ));
        }
        if next == BatchStatus::NotaIssued {
            self.ensure_ready_for_nota()?;
        }

        Ok(self.transition(next, actor, None))
    }

    /// Advances only if `target` is the direct successor
    ///
    /// Returns `Ok(false)` without touching the batch when it already sits
    /// at or beyond `target`, which makes mirror transitions replayable.
    pub fn advance_to(&mut self, target: BatchStatus, actor: &Actor) -> Result<bool, BatchError> {
        if self.status.has_reached(target) {
            return Ok(false);
        }
        if self.status.successor() != Some(target) {
            return Err(BatchError::invalid(
                self.status,
                format!("{} is not the next state", target.as_str()),
            ));
        }
        self.advance(actor)?;
        Ok(true)
    }

    /// Closes the batch once no debtor awaits review
    pub fn close(&mut self, pending_reviews: usize, actor: &Actor) -> Result<BatchStatus, BatchError> {
        if !matches!(self.status, BatchStatus::Paid | BatchStatus::Reopened) {
            return Err(BatchError::invalid(self.status, "only Paid or Reopened batches close"));
        }
        if pending_reviews > 0 {
            return Err(BatchError::PendingReviewExists(pending_reviews));
        }

        let previous = self.transition(BatchStatus::Closed, actor, None);
        self.operational_locked = true;
        Ok(previous)
    }

    /// Rejects a matched batch
    pub fn reject(&mut self, reason: &str, actor: &Actor) -> Result<BatchStatus, BatchError> {
        if self.status != BatchStatus::Matched {
            return Err(BatchError::invalid(self.status, "only Matched batches can be rejected"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BatchError::MissingReason("reject a batch"));
        }

        self.rejection_reason = Some(reason.to_string());
        Ok(self.transition(BatchStatus::Rejected, actor, Some(reason.to_string())))
    }

    /// Files a reopen request against a closed batch
    pub fn request_reopen(
        &mut self,
        reason: &str,
        impact: ReopenImpact,
        actor: &Actor,
    ) -> Result<BatchStatus, BatchError> {
        if self.status != BatchStatus::Closed {
            return Err(BatchError::invalid(self.status, "only Closed batches can be reopened"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BatchError::MissingReason("request a reopen"));
        }

        self.reopen_request = Some(ReopenRequest {
            reason: reason.to_string(),
            impact,
            requested_by: actor.email.clone(),
            requested_at: Utc::now(),
            approved: None,
            resolved_by: None,
            resolved_at: None,
        });
        Ok(self.transition(BatchStatus::ReopenRequested, actor, Some(reason.to_string())))
    }

    /// Approves or declines the pending reopen request
    pub fn resolve_reopen(&mut self, approve: bool, actor: &Actor) -> Result<BatchStatus, BatchError> {
        if self.status != BatchStatus::ReopenRequested {
            return Err(BatchError::invalid(self.status, "no reopen request pending"));
        }

        if let Some(request) = self.reopen_request.as_mut() {
            request.approved = Some(approve);
            request.resolved_by = Some(actor.email.clone());
            request.resolved_at = Some(Utc::now());
        }

        if approve {
            let previous = self.transition(BatchStatus::Reopened, actor, None);
            self.operational_locked = false;
            Ok(previous)
        } else {
            Ok(self.transition(BatchStatus::Closed, actor, Some("reopen declined".to_string())))
        }
    }

    /// Applies a debtor review outcome
    ///
    /// Returns `true` when final amounts already existed and were retained
    /// rather than recomputed.
    pub fn record_review_outcome(&mut self, outcome: &ReviewOutcome) -> bool {
        self.debtor_review_completed = outcome.progress.is_complete();
        self.batch_ready_for_nota = outcome.progress.is_ready_for_nota();
        self.updated_at = Utc::now();

        match (&self.final_premium_amount, &outcome.final_amounts) {
            (None, Some(finals)) => {
                self.final_exposure_amount = Some(finals.exposure);
                self.final_premium_amount = Some(finals.premium);
                false
            }
            (Some(_), Some(_)) => true,
            _ => false,
        }
    }

    /// Whether debtor records of this batch may be created or changed
    pub fn ensure_debtors_mutable(&self) -> Result<(), BatchError> {
        if self.operational_locked {
            return Err(BatchError::OperationallyLocked);
        }
        if self.status == BatchStatus::Rejected {
            return Err(BatchError::invalid(self.status, "batch was rejected"));
        }
        Ok(())
    }

    /// Review gate for Nota issuance
    pub fn ensure_ready_for_nota(&self) -> Result<(), BatchError> {
        if !self.batch_ready_for_nota {
            return Err(BatchError::GateNotSatisfied(
                "debtor review is not complete for this batch".to_string(),
            ));
        }
        Ok(())
    }

    /// Final (reviewed) exposure and premium
    pub fn final_amounts(&self) -> Result<(Money, Money), BatchError> {
        match (self.final_exposure_amount, self.final_premium_amount) {
            (Some(exposure), Some(premium)) => Ok((exposure, premium)),
            _ => Err(BatchError::FinalAmountsMissing),
        }
    }

    fn transition(&mut self, to: BatchStatus, actor: &Actor, reason: Option<String>) -> BatchStatus {
        let from = self.status;
        let now = Utc::now();
        self.history.push(StatusChange {
            from,
            to,
            actor_email: actor.email.clone(),
            actor_role: actor.role.to_string(),
            reason,
            at: now,
        });
        self.status = to;
        self.updated_at = now;
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Role;
    use rust_decimal_macros::dec;

    use crate::review::{FinalAmounts, ReviewProgress};

    fn actor() -> Actor {
        Actor::new("uw@reinsure.test", Role::Underwriter)
    }

    fn batch_at(status: BatchStatus) -> Batch {
        let mut batch = Batch::uploaded(ContractId::new(), "TR-01", 3, 2025, Currency::IDR, &actor());
        batch.status = status;
        batch
    }

    #[test]
    fn test_successor_table() {
        assert_eq!(BatchStatus::Uploaded.successor(), Some(BatchStatus::Validated));
        assert_eq!(BatchStatus::Paid.successor(), Some(BatchStatus::Closed));
        assert_eq!(BatchStatus::Reopened.successor(), Some(BatchStatus::Closed));
        assert_eq!(BatchStatus::Closed.successor(), None);
        assert_eq!(BatchStatus::Rejected.successor(), None);
    }

    #[test]
    fn test_advance_records_history() {
        let mut batch = batch_at(BatchStatus::Uploaded);
        let previous = batch.advance(&actor()).unwrap();

        assert_eq!(previous, BatchStatus::Uploaded);
        assert_eq!(batch.status, BatchStatus::Validated);
        assert_eq!(batch.history.len(), 1);
        assert_eq!(batch.history[0].actor_email, "uw@reinsure.test");
    }

    #[test]
    fn test_advance_into_nota_issued_requires_gate() {
        let mut batch = batch_at(BatchStatus::Approved);
        let err = batch.advance(&actor()).unwrap_err();

        assert!(matches!(err, BatchError::GateNotSatisfied(_)));
        assert_eq!(batch.status, BatchStatus::Approved);
        assert!(batch.history.is_empty());

        batch.batch_ready_for_nota = true;
        batch.advance(&actor()).unwrap();
        assert_eq!(batch.status, BatchStatus::NotaIssued);
    }

    #[test]
    fn test_advance_does_not_close() {
        let mut batch = batch_at(BatchStatus::Paid);
        assert!(matches!(
            batch.advance(&actor()),
            Err(BatchError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_advance_to_is_replayable() {
        let mut batch = batch_at(BatchStatus::BranchConfirmed);
        assert!(batch.advance_to(BatchStatus::Paid, &actor()).unwrap());
        assert!(!batch.advance_to(BatchStatus::Paid, &actor()).unwrap());
        assert_eq!(batch.history.len(), 1);
    }

    #[test]
    fn test_advance_to_rejects_skips() {
        let mut batch = batch_at(BatchStatus::Approved);
        batch.batch_ready_for_nota = true;
        assert!(batch.advance_to(BatchStatus::Paid, &actor()).is_err());
    }

    #[test]
    fn test_close_guard() {
        let mut batch = batch_at(BatchStatus::Paid);
        assert_eq!(
            batch.close(2, &actor()),
            Err(BatchError::PendingReviewExists(2))
        );
        assert_eq!(batch.status, BatchStatus::Paid);

        batch.close(0, &actor()).unwrap();
        assert_eq!(batch.status, BatchStatus::Closed);
        assert!(batch.operational_locked);
    }

    #[test]
    fn test_reject_only_from_matched_with_reason() {
        let mut batch = batch_at(BatchStatus::Validated);
        assert!(batch.reject("bad data", &actor()).is_err());

        let mut batch = batch_at(BatchStatus::Matched);
        assert_eq!(
            batch.reject("  ", &actor()),
            Err(BatchError::MissingReason("reject a batch"))
        );
        batch.reject("duplicate upload", &actor()).unwrap();
        assert_eq!(batch.status, BatchStatus::Rejected);
        assert_eq!(batch.rejection_reason.as_deref(), Some("duplicate upload"));
    }

    #[test]
    fn test_reopen_cycle() {
        let mut batch = batch_at(BatchStatus::Closed);
        batch.operational_locked = true;

        batch
            .request_reopen("fix rejected debtor", ReopenImpact::DebtorCorrection, &actor())
            .unwrap();
        assert_eq!(batch.status, BatchStatus::ReopenRequested);

        batch.resolve_reopen(true, &actor()).unwrap();
        assert_eq!(batch.status, BatchStatus::Reopened);
        assert!(!batch.operational_locked);
        assert_eq!(batch.reopen_request.as_ref().unwrap().approved, Some(true));

        batch.close(0, &actor()).unwrap();
        assert_eq!(batch.status, BatchStatus::Closed);
        assert!(batch.operational_locked);
    }

    #[test]
    fn test_declined_reopen_returns_to_closed() {
        let mut batch = batch_at(BatchStatus::Closed);
        batch.operational_locked = true;
        batch.request_reopen("typo", ReopenImpact::Other, &actor()).unwrap();
        batch.resolve_reopen(false, &actor()).unwrap();

        assert_eq!(batch.status, BatchStatus::Closed);
        assert!(batch.operational_locked);
    }

    #[test]
    fn test_review_outcome_sets_finals_once() {
        let mut batch = batch_at(BatchStatus::Approved);
        let outcome = ReviewOutcome {
            progress: ReviewProgress { total: 2, approved: 1, rejected: 1, pending: 0 },
            final_amounts: Some(FinalAmounts {
                exposure: Money::idr(dec!(50000000)),
                premium: Money::idr(dec!(1000000)),
            }),
        };

        assert!(!batch.record_review_outcome(&outcome));
        assert!(batch.batch_ready_for_nota);
        assert_eq!(batch.final_premium_amount, Some(Money::idr(dec!(1000000))));

        let later = ReviewOutcome {
            progress: outcome.progress,
            final_amounts: Some(FinalAmounts {
                exposure: Money::idr(dec!(1)),
                premium: Money::idr(dec!(1)),
            }),
        };
        assert!(batch.record_review_outcome(&later));
        assert_eq!(batch.final_premium_amount, Some(Money::idr(dec!(1000000))));
    }

    #[test]
    fn test_has_reached() {
        assert!(BatchStatus::Paid.has_reached(BatchStatus::NotaIssued));
        assert!(!BatchStatus::Approved.has_reached(BatchStatus::NotaIssued));
        assert!(BatchStatus::Reopened.has_reached(BatchStatus::Paid));
        assert!(!BatchStatus::Rejected.has_reached(BatchStatus::Paid));
    }
}
