//! Planned payments
//!
//! Confirming a nota creates one intent sized to the nota. Finance submits
//! it, an elevated role approves it, and matching a receipt completes it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, ContractId, Entity, InvoiceId, Money, NotaId, PaymentIntentId};

use crate::error::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    Full,
    Partial,
    Instalment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub nota_id: NotaId,
    pub invoice_id: Option<InvoiceId>,
    pub contract_id: ContractId,
    pub payment_type: PaymentType,
    pub planned_amount: Money,
    pub planned_date: NaiveDate,
    pub status: IntentStatus,
    pub submitted_by: Option<String>,
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for PaymentIntent {
    type Id = PaymentIntentId;
    const KIND: &'static str = "PaymentIntent";

    fn id(&self) -> PaymentIntentId {
        self.id
    }
}

impl PaymentIntent {
    pub fn draft(
        nota_id: NotaId,
        invoice_id: Option<InvoiceId>,
        contract_id: ContractId,
        payment_type: PaymentType,
        planned_amount: Money,
        planned_date: NaiveDate,
    ) -> Result<Self, BillingError> {
        if !planned_amount.is_positive() {
            return Err(BillingError::InvalidAmount(format!(
                "planned amount must be positive, got {}",
                planned_amount
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: PaymentIntentId::new_v7(),
            nota_id,
            invoice_id,
            contract_id,
            payment_type,
            planned_amount,
            planned_date,
            status: IntentStatus::Draft,
            submitted_by: None,
            decided_by: None,
            rejection_reason: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn submit(&mut self, actor: &Actor) -> Result<IntentStatus, BillingError> {
        let from = self.step(IntentStatus::Draft, IntentStatus::Submitted)?;
        self.submitted_by = Some(actor.email.clone());
        Ok(from)
    }

    pub fn approve(&mut self, actor: &Actor) -> Result<IntentStatus, BillingError> {
        let from = self.step(IntentStatus::Submitted, IntentStatus::Approved)?;
        self.decided_by = Some(actor.email.clone());
        Ok(from)
    }

    pub fn reject(&mut self, reason: impl Into<String>, actor: &Actor) -> Result<IntentStatus, BillingError> {
        let from = self.step(IntentStatus::Submitted, IntentStatus::Rejected)?;
        self.decided_by = Some(actor.email.clone());
        self.rejection_reason = Some(reason.into());
        Ok(from)
    }

    /// Closes the intent once a receipt has been matched to it
    pub fn complete(&mut self) -> Result<IntentStatus, BillingError> {
        let from = self.step(IntentStatus::Approved, IntentStatus::Completed)?;
        self.completed_at = Some(self.updated_at);
        Ok(from)
    }

    /// Only approved intents take part in matching
    pub fn is_matchable(&self) -> bool {
        self.status == IntentStatus::Approved
    }

    fn step(&mut self, expected: IntentStatus, to: IntentStatus) -> Result<IntentStatus, BillingError> {
        if self.status != expected {
            return Err(BillingError::invalid(
                "PaymentIntent",
                self.status,
                format!("expected {:?} to move to {:?}", expected, to),
            ));
        }
        let from = self.status;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Role;
    use rust_decimal_macros::dec;

    fn intent() -> PaymentIntent {
        PaymentIntent::draft(
            NotaId::new(),
            Some(InvoiceId::new()),
            ContractId::new(),
            PaymentType::Full,
            Money::idr(dec!(10000000)),
            NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_approval_path() {
        let mut i = intent();
        assert!(!i.is_matchable());
        assert!(i.complete().is_err());

        i.submit(&Actor::new("fin@reinsure.test", Role::Finance)).unwrap();
        i.approve(&Actor::new("mgr@reinsure.test", Role::Manager)).unwrap();
        assert!(i.is_matchable());

        i.complete().unwrap();
        assert_eq!(i.status, IntentStatus::Completed);
        assert!(i.completed_at.is_some());
    }

    #[test]
    fn test_reject_requires_submitted() {
        let mut i = intent();
        let mgr = Actor::new("mgr@reinsure.test", Role::Manager);
        assert!(i.reject("wrong amount", &mgr).is_err());

        i.submit(&Actor::new("fin@reinsure.test", Role::Finance)).unwrap();
        i.reject("wrong amount", &mgr).unwrap();
        assert_eq!(i.status, IntentStatus::Rejected);
        assert_eq!(i.rejection_reason.as_deref(), Some("wrong amount"));
    }

    #[test]
    fn test_payment_type_serializes_uppercase() {
        let json = serde_json::to_string(&PaymentType::Instalment).unwrap();
        assert_eq!(json, "\"INSTALMENT\"");
    }
}
