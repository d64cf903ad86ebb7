//! Nota lifecycle
//!
//! A nota is the billing instrument raised for a reviewed batch or an
//! approved claim. It only moves forward and is never deleted; a wrong nota
//! is corrected with a debit/credit note. The amount is fixed at creation
//! and has no setter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, BatchId, ClaimId, ContractId, Entity, Money, MoneyError, NotaId};

use crate::adjustment::DebitCreditNote;
use crate::error::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotaType {
    Batch,
    Claim,
    Subrogation,
}

/// Nota states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotaStatus {
    Draft,
    Issued,
    Confirmed,
    Paid,
}

impl NotaStatus {
    pub fn successor(&self) -> Option<NotaStatus> {
        match self {
            NotaStatus::Draft => Some(NotaStatus::Issued),
            NotaStatus::Issued => Some(NotaStatus::Confirmed),
            NotaStatus::Confirmed => Some(NotaStatus::Paid),
            NotaStatus::Paid => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotaStatus::Draft => "Draft",
            NotaStatus::Issued => "Issued",
            NotaStatus::Confirmed => "Confirmed",
            NotaStatus::Paid => "Paid",
        }
    }
}

/// What a nota bills for; a weak reference, nothing cascades on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum NotaReference {
    Batch(BatchId),
    Claim(ClaimId),
}

impl NotaReference {
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            NotaReference::Batch(id) => Some(*id),
            NotaReference::Claim(_) => None,
        }
    }

    pub fn claim_id(&self) -> Option<ClaimId> {
        match self {
            NotaReference::Claim(id) => Some(*id),
            NotaReference::Batch(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaStatusChange {
    pub from: NotaStatus,
    pub to: NotaStatus,
    pub actor_email: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nota {
    pub id: NotaId,
    pub nota_number: String,
    pub nota_type: NotaType,
    pub reference: NotaReference,
    pub contract_id: ContractId,
    amount: Money,
    pub status: NotaStatus,
    pub payment_reference: Option<String>,
    pub history: Vec<NotaStatusChange>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Nota {
    type Id = NotaId;
    const KIND: &'static str = "Nota";

    fn id(&self) -> NotaId {
        self.id
    }
}

impl Nota {
    /// Creates a draft nota
    pub fn draft(
        nota_type: NotaType,
        reference: NotaReference,
        contract_id: ContractId,
        amount: Money,
        created_by: &Actor,
    ) -> Result<Self, BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidAmount(format!(
                "nota amount must be positive, got {}",
                amount
            )));
        }

        let now = Utc::now();
        let id = NotaId::new_v7();
        let prefix = match nota_type {
            NotaType::Batch => "NB",
            NotaType::Claim => "NC",
            NotaType::Subrogation => "NS",
        };

        Ok(Self {
            id,
            nota_number: format!("{}-{}", prefix, &id.as_uuid().simple().to_string()[..12]),
            nota_type,
            reference,
            contract_id,
            amount,
            status: NotaStatus::Draft,
            payment_reference: None,
            history: Vec::new(),
            created_by: created_by.email.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Billed amount as issued
    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn is_paid(&self) -> bool {
        self.status == NotaStatus::Paid
    }

    /// Amount still expected against this nota once acknowledged notes apply
    ///
    /// `effective = amount - sum(acknowledged adjustment_amount)`. Note amounts
    /// are signed like the residual they close: a debit note (shortfall) is
    /// positive and lowers the figure, a credit note (overpayment) is negative
    /// and raises it. Notes that are not yet acknowledged do not count.
    pub fn effective_amount(&self, adjustments: &[DebitCreditNote]) -> Result<Money, MoneyError> {
        let overlay =
            DebitCreditNote::acknowledged_total(self.id, self.amount.currency(), adjustments)?;
        self.amount.checked_sub(&overlay)
    }

    /// Moves to the successor state
    pub fn advance(
        &mut self,
        actor: &Actor,
        payment_reference: Option<String>,
    ) -> Result<NotaStatus, BillingError> {
        let next = self
            .status
            .successor()
            .ok_or_else(|| BillingError::invalid("Nota", self.status, "no successor state"))?;

        if next == NotaStatus::Paid {
            if let Some(reference) = payment_reference {
                self.payment_reference = Some(reference);
            }
        }

        Ok(self.transition(next, actor))
    }

    /// Marks the nota paid; `Ok(false)` if it already was
    pub fn mark_paid(
        &mut self,
        actor: &Actor,
        payment_reference: Option<String>,
    ) -> Result<bool, BillingError> {
        match self.status {
            NotaStatus::Paid => Ok(false),
            NotaStatus::Confirmed => {
                self.advance(actor, payment_reference)?;
                Ok(true)
            }
            other => Err(BillingError::invalid("Nota", other, "only Confirmed notas can be paid")),
        }
    }

    fn transition(&mut self, to: NotaStatus, actor: &Actor) -> NotaStatus {
        let from = self.status;
        let now = Utc::now();
        self.history.push(NotaStatusChange {
            from,
            to,
            actor_email: actor.email.clone(),
            at: now,
        });
        self.status = to;
        self.updated_at = now;
        from
    }
}
