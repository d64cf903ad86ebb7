//! Claim Workflow Tests

use rust_decimal_macros::dec;

use core_kernel::Money;
use domain_batch::Debtor;
use domain_billing::{NotaReference, NotaStatus, NotaType};
use domain_claims::ClaimStatus;
use domain_settlement::{Action, WorkflowError};
use test_utils::{assert_blocked, ActorFixtures, SettlementHarness};

/// Batch whose nota was marked paid, with its debtors
async fn paid_batch(harness: &SettlementHarness) -> (core_kernel::BatchId, Vec<Debtor>) {
    let (batch, nota) = harness.confirmed_nota(&[dec!(4000000), dec!(6000000)]).await;
    harness.advance_nota_to(nota.id, NotaStatus::Paid).await;
    let debtors = harness.service.debtors_of(batch.id).await.unwrap();
    (batch.id, debtors)
}

#[tokio::test]
async fn test_claim_waits_for_paid_nota() {
    let harness = SettlementHarness::new();
    let (batch, _) = harness.confirmed_nota(&[dec!(5000000)]).await;
    let debtors = harness.service.debtors_of(batch.id).await.unwrap();
    let branch = ActorFixtures::branch();

    let claim = harness
        .service
        .create_claim(&branch, batch.id, debtors[0].id, Money::idr(dec!(2000000)))
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Draft);

    let err = harness.service.submit_claim(&branch, claim.id).await.unwrap_err();

    assert!(matches!(err, WorkflowError::GateNotSatisfied(_)), "got {:?}", err);
    assert_blocked(&harness.audit().await, Action::ClaimSubmit);
    assert_eq!(
        harness.service.get_claim(claim.id).await.unwrap().status,
        ClaimStatus::Draft
    );
}

#[tokio::test]
async fn test_approved_claim_raises_nota_that_settles_it() {
    let harness = SettlementHarness::new();
    let (batch_id, debtors) = paid_batch(&harness).await;
    let branch = ActorFixtures::branch();
    let uw = ActorFixtures::underwriter();

    let claim = harness
        .service
        .create_claim(&branch, batch_id, debtors[1].id, Money::idr(dec!(3000000)))
        .await
        .unwrap();
    harness.service.submit_claim(&branch, claim.id).await.unwrap();
    let approved = harness.service.approve_claim(&uw, claim.id).await.unwrap();

    assert_eq!(approved.status, ClaimStatus::Approved);
    let nota_id = approved.nota_id.expect("claim nota linked");
    let nota = harness.service.get_nota(nota_id).await.unwrap();
    assert_eq!(nota.nota_type, NotaType::Claim);
    assert_eq!(nota.reference, NotaReference::Claim(claim.id));
    assert_eq!(nota.amount(), Money::idr(dec!(3000000)));

    let again = harness.service.approve_claim(&uw, claim.id).await.unwrap();
    assert_eq!(again.nota_id, Some(nota_id));

    harness.advance_nota_to(nota_id, NotaStatus::Paid).await;

    let settled = harness.service.get_claim(claim.id).await.unwrap();
    assert_eq!(settled.status, ClaimStatus::Settled);
    assert!(harness.service.reconciliation_for(nota_id).await.is_err());

    let claims = harness.service.claims_of_batch(batch_id).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].id, claim.id);
}

#[tokio::test]
async fn test_claim_rejection_needs_reason() {
    let harness = SettlementHarness::new();
    let (batch_id, debtors) = paid_batch(&harness).await;
    let branch = ActorFixtures::branch();
    let uw = ActorFixtures::underwriter();

    let claim = harness
        .service
        .create_claim(&branch, batch_id, debtors[0].id, Money::idr(dec!(1000000)))
        .await
        .unwrap();
    harness.service.submit_claim(&branch, claim.id).await.unwrap();

    let err = harness.service.reject_claim(&uw, claim.id, "  ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_blocked(&harness.audit().await, Action::ClaimDecide);

    let rejected = harness
        .service
        .reject_claim(&uw, claim.id, "debtor recovered")
        .await
        .unwrap();
    assert_eq!(rejected.status, ClaimStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("debtor recovered"));
    assert!(rejected.nota_id.is_none());

    let err = harness.service.approve_claim(&uw, claim.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_claim_debtor_must_belong_to_batch() {
    let harness = SettlementHarness::new();
    let (batch_id, _) = paid_batch(&harness).await;
    let (_, other_debtors) = harness.matched_batch(&[dec!(2000000)]).await;

    let err = harness
        .service
        .create_claim(
            &ActorFixtures::branch(),
            batch_id,
            other_debtors[0].id,
            Money::idr(dec!(1000000)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_blocked(&harness.audit().await, Action::ClaimCreate);
    assert!(harness.service.claims_of_batch(batch_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_underwriting_decides_claims() {
    let harness = SettlementHarness::new();
    let (batch_id, debtors) = paid_batch(&harness).await;
    let branch = ActorFixtures::branch();

    let claim = harness
        .service
        .create_claim(&branch, batch_id, debtors[0].id, Money::idr(dec!(1000000)))
        .await
        .unwrap();
    harness.service.submit_claim(&branch, claim.id).await.unwrap();

    let err = harness.service.approve_claim(&branch, claim.id).await.unwrap_err();
    assert!(err.is_role_denied());
    assert_eq!(
        harness.service.get_claim(claim.id).await.unwrap().status,
        ClaimStatus::Submitted
    );
}
