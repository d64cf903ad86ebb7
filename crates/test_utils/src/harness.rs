//! In-memory settlement harness
//!
//! Wraps an [`InMemoryBackend`] and its [`SettlementService`], with
//! shortcuts that drive a batch or nota to the state a test starts from.
//! Every shortcut goes through the public workflow operations, so the
//! audit trail and notifications look exactly as in production.

use core_kernel::{Money, NotaId};
use domain_batch::{Batch, BatchStatus, Debtor, UnderwritingDecision};
use domain_billing::{Invoice, Nota, NotaStatus, PaymentIntent};
use domain_settlement::{AuditEntry, BatchIntake, SettlementConfig, SettlementService};
use infra_store::InMemoryBackend;
use rust_decimal::Decimal;

use crate::builders::BatchIntakeBuilder;
use crate::fixtures::ActorFixtures;

pub struct SettlementHarness {
    pub backend: InMemoryBackend,
    pub service: SettlementService,
}

impl Default for SettlementHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementHarness {
    pub fn new() -> Self {
        Self::with_config(SettlementConfig::default())
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        let backend = InMemoryBackend::new();
        let service = backend.service(config);
        Self { backend, service }
    }

    /// Every audit entry recorded so far
    pub async fn audit(&self) -> Vec<AuditEntry> {
        self.backend.audit.entries().await
    }

    /// Uploads `intake` as the branch and returns the batch with its debtors
    pub async fn upload(&self, intake: BatchIntake) -> (Batch, Vec<Debtor>) {
        let batch = self
            .service
            .ingest_batch(&ActorFixtures::branch(), intake)
            .await
            .expect("upload");
        let debtors = self.service.debtors_of(batch.id).await.expect("debtors");
        (batch, debtors)
    }

    /// Advances a batch one step at a time until it sits at `target`
    pub async fn advance_batch_to(&self, batch: &Batch, target: BatchStatus) -> Batch {
        let uw = ActorFixtures::underwriter();
        let mut current = self.service.get_batch(batch.id).await.expect("batch");
        while current.status != target {
            current = self
                .service
                .advance_batch(&uw, current.id)
                .await
                .unwrap_or_else(|e| panic!("advance {:?} towards {:?}: {}", current.status, target, e));
        }
        current
    }

    pub async fn decide_all(&self, debtors: &[Debtor], decision: UnderwritingDecision) {
        let uw = ActorFixtures::underwriter();
        for debtor in debtors {
            self.service
                .decide_debtor(&uw, debtor.id, decision, None)
                .await
                .expect("decide debtor");
        }
    }

    /// A `Matched` batch whose debtors all carry the given net premiums
    pub async fn matched_batch(&self, premiums: &[Decimal]) -> (Batch, Vec<Debtor>) {
        let (batch, debtors) = self
            .upload(BatchIntakeBuilder::new().with_premiums(premiums).build())
            .await;
        let batch = self.advance_batch_to(&batch, BatchStatus::Matched).await;
        (batch, debtors)
    }

    /// An `Approved` batch with every debtor approved; ready for its nota
    pub async fn approved_batch(&self, premiums: &[Decimal]) -> (Batch, Vec<Debtor>) {
        let (batch, debtors) = self.matched_batch(premiums).await;
        self.decide_all(&debtors, UnderwritingDecision::Approve).await;
        let batch = self.advance_batch_to(&batch, BatchStatus::Approved).await;
        let debtors = self.service.debtors_of(batch.id).await.expect("debtors");
        (batch, debtors)
    }

    /// Advances a nota as finance until it sits at `target`
    pub async fn advance_nota_to(&self, nota_id: NotaId, target: NotaStatus) -> Nota {
        let finance = ActorFixtures::finance();
        let mut nota = self.service.get_nota(nota_id).await.expect("nota");
        while nota.status != target {
            nota = self
                .service
                .advance_nota(&finance, nota_id, None)
                .await
                .unwrap_or_else(|e| panic!("advance nota from {:?}: {}", nota.status, e));
        }
        nota
    }

    /// A `Confirmed` batch nota over an approved batch
    pub async fn confirmed_nota(&self, premiums: &[Decimal]) -> (Batch, Nota) {
        let (batch, _) = self.approved_batch(premiums).await;
        let nota = self
            .service
            .create_batch_nota(&ActorFixtures::finance(), batch.id)
            .await
            .expect("create nota");
        let nota = self.advance_nota_to(nota.id, NotaStatus::Confirmed).await;
        let batch = self.service.get_batch(batch.id).await.expect("batch");
        (batch, nota)
    }

    /// The nota's payment intent, submitted by finance and approved by a manager
    pub async fn approved_intent(&self, nota_id: NotaId) -> PaymentIntent {
        let intent = self.intent_of(nota_id).await;
        self.service
            .submit_intent(&ActorFixtures::finance(), intent.id)
            .await
            .expect("submit intent");
        self.service
            .approve_intent(&ActorFixtures::manager(), intent.id)
            .await
            .expect("approve intent")
    }

    pub async fn intent_of(&self, nota_id: NotaId) -> PaymentIntent {
        self.service
            .intents_for_nota(nota_id)
            .await
            .expect("intents")
            .into_iter()
            .next()
            .expect("nota has an intent")
    }

    pub async fn invoice_of(&self, nota_id: NotaId) -> Invoice {
        self.service
            .invoice_of_nota(nota_id)
            .await
            .expect("invoice lookup")
            .expect("nota has an invoice")
    }

    /// Sum of what the batch's debtors have received
    pub async fn distributed_total(&self, batch: &Batch) -> Money {
        let debtors = self.service.debtors_of(batch.id).await.expect("debtors");
        Money::sum(batch.currency, debtors.iter().map(|d| &d.payment_received_amount)).expect("sum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_confirmed_nota_bills_the_final_premium() {
        let harness = SettlementHarness::new();
        let (batch, nota) = harness.confirmed_nota(&[dec!(4000000), dec!(6000000)]).await;

        assert_eq!(nota.status, NotaStatus::Confirmed);
        assert_eq!(nota.amount(), Money::idr(dec!(10000000)));
        assert_eq!(batch.status, BatchStatus::BranchConfirmed);
        assert!(batch.batch_ready_for_nota);
    }
}
