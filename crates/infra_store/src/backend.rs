//! Wiring of a complete in-memory backend

use std::sync::Arc;

use domain_batch::{AcceptedDebtor, Batch, Debtor};
use domain_billing::{DebitCreditNote, Invoice, Nota, Payment, PaymentIntent, ReconciliationRecord};
use domain_claims::Claim;
use domain_settlement::{NotificationDispatcher, SettlementConfig, SettlementService, Stores};

use crate::audit_trail::InMemoryAuditTrail;
use crate::dispatch::RecordingNotificationDispatcher;
use crate::entity_store::InMemoryEntityStore;

/// Every store the orchestrator needs, kept concrete so callers can inspect
/// them or inject failures
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    pub batches: Arc<InMemoryEntityStore<Batch>>,
    pub debtors: Arc<InMemoryEntityStore<Debtor>>,
    pub accepted_debtors: Arc<InMemoryEntityStore<AcceptedDebtor>>,
    pub notas: Arc<InMemoryEntityStore<Nota>>,
    pub invoices: Arc<InMemoryEntityStore<Invoice>>,
    pub intents: Arc<InMemoryEntityStore<PaymentIntent>>,
    pub payments: Arc<InMemoryEntityStore<Payment>>,
    pub reconciliations: Arc<InMemoryEntityStore<ReconciliationRecord>>,
    pub adjustments: Arc<InMemoryEntityStore<DebitCreditNote>>,
    pub claims: Arc<InMemoryEntityStore<Claim>>,
    pub audit: Arc<InMemoryAuditTrail>,
    pub notifications: Arc<RecordingNotificationDispatcher>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            batches: self.batches.clone(),
            debtors: self.debtors.clone(),
            accepted_debtors: self.accepted_debtors.clone(),
            notas: self.notas.clone(),
            invoices: self.invoices.clone(),
            intents: self.intents.clone(),
            payments: self.payments.clone(),
            reconciliations: self.reconciliations.clone(),
            adjustments: self.adjustments.clone(),
            claims: self.claims.clone(),
        }
    }

    /// A service recording its notifications in this backend
    pub fn service(&self, config: SettlementConfig) -> SettlementService {
        SettlementService::new(self.stores(), self.audit.clone(), self.notifications.clone(), config)
    }

    /// A service sending its notifications to `dispatcher` instead
    pub fn service_with(
        &self,
        config: SettlementConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> SettlementService {
        SettlementService::new(self.stores(), self.audit.clone(), dispatcher, config)
    }
}
