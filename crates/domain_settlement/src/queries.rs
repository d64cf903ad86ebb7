//! Read-side lookups
//!
//! Queries take no locks and audit nothing.

use core_kernel::{BatchId, ClaimId, NotaId, PaymentId};
use domain_batch::{AcceptedDebtor, Batch, Debtor};
use domain_billing::{Invoice, Nota, Payment, PaymentIntent};
use domain_claims::Claim;

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::service::SettlementService;
use crate::store::find;

impl SettlementService {
    pub async fn get_batch(&self, batch_id: BatchId) -> Result<Batch, WorkflowError> {
        Ok(self.stores.batches.get(batch_id).await?.into_inner())
    }

    /// Batches, newest period first
    pub async fn list_batches(&self) -> Result<Vec<Batch>, WorkflowError> {
        let mut batches = find(&*self.stores.batches, |_: &Batch| true).await?;
        batches.sort_by(|a, b| (b.year, b.month, b.created_at).cmp(&(a.year, a.month, a.created_at)));
        Ok(batches)
    }

    pub async fn debtors_of(&self, batch_id: BatchId) -> Result<Vec<Debtor>, WorkflowError> {
        let mut debtors = find(&*self.stores.debtors, |d: &Debtor| d.batch_id == batch_id).await?;
        debtors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(debtors)
    }

    /// Approval snapshots of a batch's debtors
    pub async fn accepted_debtors_of(&self, batch_id: BatchId) -> Result<Vec<AcceptedDebtor>, WorkflowError> {
        find(&*self.stores.accepted_debtors, |a: &AcceptedDebtor| a.batch_id == batch_id).await
    }

    pub async fn get_nota(&self, nota_id: NotaId) -> Result<Nota, WorkflowError> {
        Ok(self.stores.notas.get(nota_id).await?.into_inner())
    }

    pub async fn notas_of_batch(&self, batch_id: BatchId) -> Result<Vec<Nota>, WorkflowError> {
        let mut notas = find(&*self.stores.notas, |n: &Nota| n.reference.batch_id() == Some(batch_id)).await?;
        notas.sort_by_key(|n| n.created_at);
        Ok(notas)
    }

    pub async fn invoice_of_nota(&self, nota_id: NotaId) -> Result<Option<Invoice>, WorkflowError> {
        let invoices = find(&*self.stores.invoices, |i: &Invoice| i.nota_id == nota_id).await?;
        Ok(invoices.into_iter().next())
    }

    pub async fn intents_for_nota(&self, nota_id: NotaId) -> Result<Vec<PaymentIntent>, WorkflowError> {
        let mut intents = find(&*self.stores.intents, |i: &PaymentIntent| i.nota_id == nota_id).await?;
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, WorkflowError> {
        Ok(self.stores.payments.get(payment_id).await?.into_inner())
    }

    /// Payments not yet matched to an intent
    pub async fn unmatched_payments(&self) -> Result<Vec<Payment>, WorkflowError> {
        let mut payments = find(&*self.stores.payments, |p: &Payment| p.intent_id.is_none()).await?;
        payments.sort_by_key(|p| p.received_date);
        Ok(payments)
    }

    pub async fn get_claim(&self, claim_id: ClaimId) -> Result<Claim, WorkflowError> {
        Ok(self.stores.claims.get(claim_id).await?.into_inner())
    }

    pub async fn claims_of_batch(&self, batch_id: BatchId) -> Result<Vec<Claim>, WorkflowError> {
        let mut claims = find(&*self.stores.claims, |c: &Claim| c.batch_id == batch_id).await?;
        claims.sort_by_key(|c| c.created_at);
        Ok(claims)
    }

    /// Audit entries of one entity, oldest first
    pub async fn audit_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, WorkflowError> {
        let mut entries = self.audit.for_entity(entity_type, entity_id).await?;
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}
