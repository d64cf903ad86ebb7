//! Entity stores used by the orchestrator

use std::sync::Arc;

use core_kernel::{Entity, EntityStore, PortError, Versioned};
use domain_batch::{AcceptedDebtor, Batch, Debtor};
use domain_billing::{DebitCreditNote, Invoice, Nota, Payment, PaymentIntent, ReconciliationRecord};
use domain_claims::Claim;

use crate::error::WorkflowError;

/// One store per entity kind
#[derive(Clone)]
pub struct Stores {
    pub batches: Arc<dyn EntityStore<Batch>>,
    pub debtors: Arc<dyn EntityStore<Debtor>>,
    pub accepted_debtors: Arc<dyn EntityStore<AcceptedDebtor>>,
    pub notas: Arc<dyn EntityStore<Nota>>,
    pub invoices: Arc<dyn EntityStore<Invoice>>,
    pub intents: Arc<dyn EntityStore<PaymentIntent>>,
    pub payments: Arc<dyn EntityStore<Payment>>,
    pub reconciliations: Arc<dyn EntityStore<ReconciliationRecord>>,
    pub adjustments: Arc<dyn EntityStore<DebitCreditNote>>,
    pub claims: Arc<dyn EntityStore<Claim>>,
}

/// Read-modify-write with optimistic retry
///
/// `change` returns `Ok(false)` when the entity is already in the wanted
/// state, in which case nothing is written. A lost version race re-reads and
/// re-applies `change` up to `retries` times.
pub async fn modify<E, F>(
    store: &dyn EntityStore<E>,
    id: E::Id,
    retries: u32,
    mut change: F,
) -> Result<(Versioned<E>, bool), WorkflowError>
where
    E: Entity,
    F: FnMut(&mut E) -> Result<bool, WorkflowError> + Send,
{
    let mut attempt = 0;
    loop {
        let current = store.get(id).await?;
        let mut entity = current.entity.clone();

        if !change(&mut entity)? {
            return Ok((current, false));
        }

        match store.update(entity, current.version).await {
            Ok(updated) => return Ok((updated, true)),
            Err(PortError::Conflict { .. }) if attempt < retries => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Entities matching `predicate`, without their versions
pub async fn find<E, P>(store: &dyn EntityStore<E>, predicate: P) -> Result<Vec<E>, WorkflowError>
where
    E: Entity,
    P: Fn(&E) -> bool + Send + Sync,
{
    Ok(store
        .filter(&predicate)
        .await?
        .into_iter()
        .map(Versioned::into_inner)
        .collect())
}
