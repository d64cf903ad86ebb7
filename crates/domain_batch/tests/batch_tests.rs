//! Integration tests for domain_batch

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Actor, ContractId, Currency, Money, Role};

use domain_batch::{
    AcceptedDebtor, Batch, BatchError, BatchStatus, Debtor, ReopenImpact, ReviewOutcome,
    UnderwritingDecision, UnderwritingStatus,
};

fn operator() -> Actor {
    Actor::new("ops@branch.test", Role::BranchOperator)
}

fn underwriter() -> Actor {
    Actor::new("uw@reinsure.test", Role::Underwriter)
}

fn batch() -> Batch {
    Batch::uploaded(ContractId::new(), "QS-2026", 3, 2026, Currency::IDR, &operator())
}

fn debtor_for(batch: &Batch, premium: Decimal) -> Debtor {
    Debtor::submitted(
        batch.id,
        batch.contract_id,
        "debtor",
        Money::idr(premium * dec!(50)),
        Money::idr(premium),
        Money::idr(premium),
    )
}

fn advance_to_approved(batch: &mut Batch) {
    for _ in 0..3 {
        batch.advance(&operator()).unwrap();
    }
    assert_eq!(batch.status, BatchStatus::Approved);
}

fn complete_review(batch: &mut Batch, debtors: &mut [Debtor], decisions: &[UnderwritingDecision]) {
    let mut snapshots = Vec::new();
    for (debtor, decision) in debtors.iter_mut().zip(decisions) {
        debtor.decide(*decision, None, &underwriter()).unwrap();
        if debtor.underwriting_status == UnderwritingStatus::Approved {
            snapshots.push(AcceptedDebtor::snapshot(debtor, &underwriter().email));
        }
    }
    let outcome = ReviewOutcome::evaluate(batch.currency, debtors, &snapshots).unwrap();
    batch.record_review_outcome(&outcome);
}

// ============================================================================
// Pipeline Tests
// ============================================================================

mod pipeline_tests {
    use super::*;

    #[test]
    fn test_batch_number_carries_period() {
        let b = batch();
        assert_eq!(b.batch_number, "BATCH-QS-2026-202603");
        assert_eq!(b.status, BatchStatus::Uploaded);
        assert!(!b.batch_ready_for_nota);
    }

    #[test]
    fn test_nota_issued_blocked_until_review_ready() {
        let mut b = batch();
        advance_to_approved(&mut b);

        let err = b.advance(&operator()).unwrap_err();
        assert!(matches!(err, BatchError::GateNotSatisfied(_)));
        assert_eq!(b.status, BatchStatus::Approved);
    }

    #[test]
    fn test_review_unlocks_nota_issuance() {
        let mut b = batch();
        let mut debtors = vec![debtor_for(&b, dec!(1000000)), debtor_for(&b, dec!(3000000))];
        complete_review(
            &mut b,
            &mut debtors,
            &[UnderwritingDecision::Approve, UnderwritingDecision::Reject],
        );
        advance_to_approved(&mut b);

        b.advance(&operator()).unwrap();
        assert_eq!(b.status, BatchStatus::NotaIssued);
        assert_eq!(b.final_premium_amount, Some(Money::idr(dec!(1000000))));
    }

    #[test]
    fn test_approval_does_not_freeze_amounts() {
        let mut b = batch().with_raw_totals(Money::idr(dec!(500000000)), Money::idr(dec!(9000000)));
        advance_to_approved(&mut b);
        assert!(b.final_premium_amount.is_none());
        assert_eq!(b.final_amounts(), Err(BatchError::FinalAmountsMissing));
    }

    #[test]
    fn test_advance_to_is_idempotent() {
        let mut b = batch();
        let mut debtors = vec![debtor_for(&b, dec!(1000000))];
        complete_review(&mut b, &mut debtors, &[UnderwritingDecision::Approve]);
        advance_to_approved(&mut b);

        assert!(b.advance_to(BatchStatus::NotaIssued, &operator()).unwrap());
        assert!(!b.advance_to(BatchStatus::NotaIssued, &operator()).unwrap());
        assert!(b.advance_to(BatchStatus::Paid, &operator()).is_err());
    }
}

// ============================================================================
// Close and Reopen Tests
// ============================================================================

mod close_tests {
    use super::*;

    fn paid_batch() -> Batch {
        let mut b = batch();
        let mut debtors = vec![debtor_for(&b, dec!(1000000))];
        complete_review(&mut b, &mut debtors, &[UnderwritingDecision::Approve]);
        advance_to_approved(&mut b);
        for _ in 0..3 {
            b.advance(&operator()).unwrap();
        }
        assert_eq!(b.status, BatchStatus::Paid);
        b
    }

    #[test]
    fn test_close_requires_terminal_reviews() {
        let mut b = paid_batch();
        assert_eq!(
            b.close(1, &underwriter()),
            Err(BatchError::PendingReviewExists(1))
        );
        assert_eq!(b.status, BatchStatus::Paid);

        b.close(0, &underwriter()).unwrap();
        assert_eq!(b.status, BatchStatus::Closed);
        assert!(b.operational_locked);
        assert_eq!(b.ensure_debtors_mutable(), Err(BatchError::OperationallyLocked));
    }

    #[test]
    fn test_reopen_cycle() {
        let mut b = paid_batch();
        b.close(0, &underwriter()).unwrap();

        b.request_reopen("wrong plafond on one debtor", ReopenImpact::DebtorCorrection, &operator())
            .unwrap();
        assert_eq!(b.status, BatchStatus::ReopenRequested);

        let manager = Actor::new("mgr@reinsure.test", Role::Manager);
        b.resolve_reopen(true, &manager).unwrap();
        assert_eq!(b.status, BatchStatus::Reopened);
        assert!(!b.operational_locked);
        assert!(b.ensure_debtors_mutable().is_ok());

        b.close(0, &underwriter()).unwrap();
        assert_eq!(b.status, BatchStatus::Closed);
    }

    #[test]
    fn test_declined_reopen_returns_to_closed() {
        let mut b = paid_batch();
        b.close(0, &underwriter()).unwrap();
        b.request_reopen("typo", ReopenImpact::Documentation, &operator()).unwrap();

        b.resolve_reopen(false, &Actor::new("mgr@reinsure.test", Role::Manager)).unwrap();
        assert_eq!(b.status, BatchStatus::Closed);
        assert!(b.operational_locked);
        assert_eq!(b.reopen_request.as_ref().and_then(|r| r.approved), Some(false));
    }

    #[test]
    fn test_finals_retained_after_reopened_review() {
        let mut b = paid_batch();
        let before = b.final_premium_amount;

        let mut debtors = vec![debtor_for(&b, dec!(7000000))];
        debtors[0].decide(UnderwritingDecision::Approve, None, &underwriter()).unwrap();
        let snapshots = vec![AcceptedDebtor::snapshot(&debtors[0], "uw@reinsure.test")];
        let outcome = ReviewOutcome::evaluate(Currency::IDR, &debtors, &snapshots).unwrap();

        assert!(b.record_review_outcome(&outcome));
        assert_eq!(b.final_premium_amount, before);
    }
}

// ============================================================================
// Rejection Tests
// ============================================================================

mod rejection_tests {
    use super::*;

    #[test]
    fn test_reject_only_from_matched_with_reason() {
        let mut b = batch();
        assert!(matches!(
            b.reject("bad data", &underwriter()),
            Err(BatchError::InvalidTransition { .. })
        ));

        b.advance(&operator()).unwrap();
        b.advance(&operator()).unwrap();
        assert_eq!(b.reject("", &underwriter()), Err(BatchError::MissingReason("reject a batch")));

        b.reject("duplicate upload", &underwriter()).unwrap();
        assert_eq!(b.status, BatchStatus::Rejected);
        assert!(b.advance(&operator()).is_err());
    }

    #[test]
    fn test_deactivated_debtors_leave_review() {
        let b = batch();
        let mut debtors = vec![debtor_for(&b, dec!(1000000)), debtor_for(&b, dec!(2000000))];
        for d in debtors.iter_mut() {
            d.deactivate(BatchStatus::Rejected);
        }

        let outcome = ReviewOutcome::evaluate(Currency::IDR, &debtors, &[]).unwrap();
        assert_eq!(outcome.progress.total, 0);
        assert!(debtors.iter().all(|d| d.batch_status == BatchStatus::Rejected));
    }
}
