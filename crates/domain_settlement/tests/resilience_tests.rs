//! Failure and Concurrency Tests
//!
//! Store outages interrupt the settlement cascade part way; advancing the
//! nota again must finish the work without repeating any of it. Audit and
//! notification outages never fail a workflow operation.

use rust_decimal_macros::dec;

use core_kernel::{EntityStore, Money};
use domain_batch::{BatchStatus, UnderwritingDecision};
use domain_billing::NotaStatus;
use domain_settlement::WorkflowError;
use test_utils::{assert_money_eq, ActorFixtures, BatchIntakeBuilder, SettlementHarness};

#[tokio::test]
async fn test_interrupted_cascade_is_replayed() {
    let harness = SettlementHarness::new();
    let (batch, nota) = harness.confirmed_nota(&[dec!(3000000), dec!(7000000)]).await;
    let finance = ActorFixtures::finance();

    harness.backend.debtors.fail_next_writes(10);
    let err = harness
        .service
        .advance_nota(&finance, nota.id, Some("TRX-001".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)), "got {:?}", err);

    let stuck = harness.service.get_nota(nota.id).await.unwrap();
    assert_eq!(stuck.status, NotaStatus::Confirmed);
    assert!(harness.invoice_of(nota.id).await.is_paid());

    harness.backend.debtors.fail_next_writes(0);
    let paid = harness
        .service
        .advance_nota(&finance, nota.id, Some("TRX-001".to_string()))
        .await
        .unwrap();

    assert!(paid.is_paid());
    assert_eq!(harness.backend.payments.list().await.unwrap().len(), 1);
    assert_money_eq(&harness.distributed_total(&batch).await, &Money::idr(dec!(10000000)));
    assert_eq!(
        harness.service.get_batch(batch.id).await.unwrap().status,
        BatchStatus::Paid
    );
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let harness = SettlementHarness::new();
    let (batch, nota) = harness.confirmed_nota(&[dec!(5000000)]).await;

    harness.backend.debtors.fail_next_writes(1);
    let paid = harness
        .service
        .advance_nota(&ActorFixtures::finance(), nota.id, None)
        .await
        .unwrap();

    assert!(paid.is_paid());
    assert_money_eq(&harness.distributed_total(&batch).await, &Money::idr(dec!(5000000)));
}

#[tokio::test]
async fn test_interrupted_upload_completes_same_batch() {
    let harness = SettlementHarness::new();
    let branch = ActorFixtures::branch();
    let intake = BatchIntakeBuilder::new()
        .with_premiums(&[dec!(1000000), dec!(2000000)])
        .build();

    harness.backend.debtors.fail_next_writes(10);
    let err = harness
        .service
        .ingest_batch(&branch, intake.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)), "got {:?}", err);
    assert_eq!(harness.backend.batches.len().await, 1);

    harness.backend.debtors.fail_next_writes(0);
    let batch = harness.service.ingest_batch(&branch, intake.clone()).await.unwrap();

    assert_eq!(harness.backend.batches.len().await, 1);
    assert_eq!(harness.service.debtors_of(batch.id).await.unwrap().len(), 2);

    let again = harness.service.ingest_batch(&branch, intake).await.unwrap();
    assert_eq!(again.id, batch.id);
    assert_eq!(harness.backend.debtors.len().await, 2);
}

#[tokio::test]
async fn test_transient_debtor_write_failure_during_upload_is_retried() {
    let harness = SettlementHarness::new();

    harness.backend.debtors.fail_next_writes(1);
    let (batch, debtors) = harness
        .upload(BatchIntakeBuilder::new().with_premiums(&[dec!(4000000)]).build())
        .await;

    assert_eq!(batch.status, BatchStatus::Uploaded);
    assert_eq!(debtors.len(), 1);
}

#[tokio::test]
async fn test_upload_of_processed_period_is_refused() {
    let harness = SettlementHarness::new();
    let intake = BatchIntakeBuilder::new().with_premiums(&[dec!(1000000)]).build();
    let (batch, _) = harness.upload(intake.clone()).await;
    harness.advance_batch_to(&batch, BatchStatus::Matched).await;

    let err = harness
        .service
        .ingest_batch(&ActorFixtures::branch(), intake)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Validation(_)), "got {:?}", err);
    assert_eq!(harness.backend.batches.len().await, 1);
}

#[tokio::test]
async fn test_workflow_survives_audit_outage() {
    let harness = SettlementHarness::new();
    harness.backend.audit.set_unavailable(true);

    let (batch, _) = harness.approved_batch(&[dec!(2000000)]).await;

    assert_eq!(batch.status, BatchStatus::Approved);
    assert!(harness.audit().await.is_empty());
}

#[tokio::test]
async fn test_workflow_survives_notification_outage() {
    let harness = SettlementHarness::new();
    harness.backend.notifications.set_unavailable(true);

    let (batch, nota) = harness.confirmed_nota(&[dec!(2000000)]).await;
    let nota = harness.advance_nota_to(nota.id, NotaStatus::Paid).await;

    assert!(nota.is_paid());
    assert!(harness.backend.notifications.emails().await.is_empty());
    assert_eq!(
        harness.service.get_batch(batch.id).await.unwrap().status,
        BatchStatus::Paid
    );
}

#[tokio::test]
async fn test_concurrent_paid_advances_settle_once() {
    let harness = SettlementHarness::new();
    let (batch, nota) = harness.confirmed_nota(&[dec!(4000000), dec!(6000000)]).await;
    let finance = ActorFixtures::finance();

    let (first, second) = tokio::join!(
        harness.service.advance_nota(&finance, nota.id, None),
        harness.service.advance_nota(&finance, nota.id, None),
    );

    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(WorkflowError::InvalidTransition(_))));

    assert_eq!(harness.backend.payments.list().await.unwrap().len(), 1);
    assert_money_eq(&harness.distributed_total(&batch).await, &Money::idr(dec!(10000000)));
}

#[tokio::test]
async fn test_concurrent_decisions_complete_review() {
    let harness = SettlementHarness::new();
    let (batch, debtors) = harness
        .upload(
            BatchIntakeBuilder::new()
                .with_premiums(&[dec!(1000000), dec!(2000000), dec!(3000000), dec!(4000000)])
                .build(),
        )
        .await;
    let batch = harness.advance_batch_to(&batch, BatchStatus::Matched).await;

    let mut tasks = Vec::new();
    for debtor in debtors {
        let service = harness.service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .decide_debtor(&ActorFixtures::underwriter(), debtor.id, UnderwritingDecision::Approve, None)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let progress = harness.service.review_progress(batch.id).await.unwrap();
    assert_eq!(progress.pending, 0);
    assert_eq!(progress.approved, 4);

    let batch = harness
        .service
        .advance_batch(&ActorFixtures::underwriter(), batch.id)
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Approved);
    assert_money_eq(
        batch.final_premium_amount.as_ref().unwrap(),
        &Money::idr(dec!(10000000)),
    );
}
