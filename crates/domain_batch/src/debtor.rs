//! Debtor records
//!
//! A debtor is one credit exposure inside a batch. It only counts toward
//! premium and exposure once underwriting approves it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, BatchId, ContractId, Currency, DebtorId, Entity, Money, MoneyError, PaymentId};

use crate::batch::BatchStatus;
use crate::error::BatchError;

/// Underwriting status of a debtor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnderwritingStatus {
    Submitted,
    Approved,
    Rejected,
}

impl UnderwritingStatus {
    /// Approved and Rejected are terminal for the close guard
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnderwritingStatus::Approved | UnderwritingStatus::Rejected)
    }
}

/// An underwriter's decision on one debtor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnderwritingDecision {
    Approve,
    Reject,
}

impl UnderwritingDecision {
    pub fn resulting_status(&self) -> UnderwritingStatus {
        match self {
            UnderwritingDecision::Approve => UnderwritingStatus::Approved,
            UnderwritingDecision::Reject => UnderwritingStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtorInvoiceStatus {
    NotInvoiced,
    Invoiced,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtorReconStatus {
    Open,
    Closed,
}

/// A debtor record owned by a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debtor {
    pub id: DebtorId,
    pub batch_id: BatchId,
    pub contract_id: ContractId,
    pub name: String,
    pub credit_plafond: Money,
    pub gross_premium: Money,
    pub net_premium: Money,
    pub outstanding_amount: Money,
    pub payment_received_amount: Money,
    /// Payments already distributed onto this debtor
    pub applied_payments: BTreeSet<PaymentId>,
    pub underwriting_status: UnderwritingStatus,
    pub underwriting_remarks: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub invoice_status: DebtorInvoiceStatus,
    pub recon_status: DebtorReconStatus,
    pub batch_status: BatchStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Debtor {
    type Id = DebtorId;
    const KIND: &'static str = "Debtor";

    fn id(&self) -> DebtorId {
        self.id
    }
}

impl Debtor {
    /// Creates a submitted debtor for a batch
    pub fn submitted(
        batch_id: BatchId,
        contract_id: ContractId,
        name: impl Into<String>,
        credit_plafond: Money,
        gross_premium: Money,
        net_premium: Money,
    ) -> Self {
        let now = Utc::now();
        let currency = net_premium.currency();

        Self {
            id: DebtorId::new_v7(),
            batch_id,
            contract_id,
            name: name.into(),
            credit_plafond,
            gross_premium,
            net_premium,
            outstanding_amount: net_premium,
            payment_received_amount: Money::zero(currency),
            applied_payments: BTreeSet::new(),
            underwriting_status: UnderwritingStatus::Submitted,
            underwriting_remarks: None,
            decided_by: None,
            decided_at: None,
            invoice_status: DebtorInvoiceStatus::NotInvoiced,
            recon_status: DebtorReconStatus::Open,
            batch_status: BatchStatus::Uploaded,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> Currency {
        self.net_premium.currency()
    }

    /// Exposure that counts toward the batch once approved
    pub fn exposure_amount(&self) -> Money {
        self.credit_plafond
    }

    /// Premium that counts toward the batch once approved
    pub fn premium_amount(&self) -> Money {
        self.net_premium
    }

    /// Records an underwriting decision
    pub fn decide(
        &mut self,
        decision: UnderwritingDecision,
        remarks: Option<String>,
        actor: &Actor,
    ) -> Result<UnderwritingStatus, BatchError> {
        if self.underwriting_status.is_terminal() {
            return Err(BatchError::AlreadyDecided(self.underwriting_status));
        }

        let previous = self.underwriting_status;
        let now = Utc::now();
        self.underwriting_status = decision.resulting_status();
        self.underwriting_remarks = remarks;
        self.decided_by = Some(actor.email.clone());
        self.decided_at = Some(now);
        self.updated_at = now;
        Ok(previous)
    }

    /// Corrects a rejected debtor and resubmits it for review
    pub fn revise(
        &mut self,
        credit_plafond: Money,
        gross_premium: Money,
        net_premium: Money,
    ) -> Result<(), BatchError> {
        if self.underwriting_status != UnderwritingStatus::Rejected {
            return Err(BatchError::NotRevisable);
        }

        self.credit_plafond = credit_plafond;
        self.gross_premium = gross_premium;
        self.net_premium = net_premium;
        self.outstanding_amount = net_premium;
        self.underwriting_status = UnderwritingStatus::Submitted;
        self.underwriting_remarks = None;
        self.decided_by = None;
        self.decided_at = None;
        self.is_active = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the debtor inactive after its batch was rejected
    pub fn deactivate(&mut self, batch_status: BatchStatus) {
        self.is_active = false;
        self.batch_status = batch_status;
        self.updated_at = Utc::now();
    }

    /// Adds a distributed payment share
    ///
    /// Returns `Ok(false)` when this payment was already applied.
    pub fn apply_payment(&mut self, payment_id: PaymentId, share: Money) -> Result<bool, MoneyError> {
        if self.applied_payments.contains(&payment_id) {
            return Ok(false);
        }

        self.payment_received_amount = self.payment_received_amount.checked_add(&share)?;
        self.outstanding_amount = self.outstanding_amount.checked_sub(&share)?.floor_zero();
        self.applied_payments.insert(payment_id);
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Marks the debtor billed once its batch nota is issued
    ///
    /// Returns `false` if it already was.
    pub fn mark_invoiced(&mut self, batch_status: BatchStatus) -> bool {
        if self.invoice_status != DebtorInvoiceStatus::NotInvoiced {
            return false;
        }
        self.invoice_status = DebtorInvoiceStatus::Invoiced;
        self.batch_status = batch_status;
        self.updated_at = Utc::now();
        true
    }

    /// Whether the settlement cascade still has work to do on this debtor
    pub fn is_settled(&self) -> bool {
        self.invoice_status == DebtorInvoiceStatus::Paid
            && self.recon_status == DebtorReconStatus::Closed
    }

    /// Final state after the invoice behind this debtor is fully paid
    pub fn mark_settled(&mut self, batch_status: BatchStatus) {
        self.invoice_status = DebtorInvoiceStatus::Paid;
        self.recon_status = DebtorReconStatus::Closed;
        self.outstanding_amount = Money::zero(self.currency());
        self.batch_status = batch_status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Role;
    use rust_decimal_macros::dec;

    fn debtor() -> Debtor {
        Debtor::submitted(
            BatchId::new(),
            ContractId::new(),
            "PT Sinar",
            Money::idr(dec!(100000000)),
            Money::idr(dec!(1200000)),
            Money::idr(dec!(1000000)),
        )
    }

    fn underwriter() -> Actor {
        Actor::new("uw@reinsure.test", Role::Underwriter)
    }

    #[test]
    fn test_decide_once() {
        let mut d = debtor();
        d.decide(UnderwritingDecision::Approve, None, &underwriter()).unwrap();
        assert_eq!(d.underwriting_status, UnderwritingStatus::Approved);
        assert_eq!(d.decided_by.as_deref(), Some("uw@reinsure.test"));

        let err = d
            .decide(UnderwritingDecision::Reject, None, &underwriter())
            .unwrap_err();
        assert_eq!(err, BatchError::AlreadyDecided(UnderwritingStatus::Approved));
    }

    #[test]
    fn test_revise_only_rejected() {
        let mut d = debtor();
        assert_eq!(
            d.revise(d.credit_plafond, d.gross_premium, d.net_premium),
            Err(BatchError::NotRevisable)
        );

        d.decide(UnderwritingDecision::Reject, Some("plafond too high".into()), &underwriter())
            .unwrap();
        d.revise(
            Money::idr(dec!(50000000)),
            Money::idr(dec!(600000)),
            Money::idr(dec!(500000)),
        )
        .unwrap();

        assert_eq!(d.underwriting_status, UnderwritingStatus::Submitted);
        assert_eq!(d.premium_amount(), Money::idr(dec!(500000)));
    }

    #[test]
    fn test_apply_payment_is_idempotent() {
        let mut d = debtor();
        let payment = PaymentId::new();

        assert!(d.apply_payment(payment, Money::idr(dec!(400000))).unwrap());
        assert!(!d.apply_payment(payment, Money::idr(dec!(400000))).unwrap());

        assert_eq!(d.payment_received_amount, Money::idr(dec!(400000)));
        assert_eq!(d.outstanding_amount, Money::idr(dec!(600000)));
    }

    #[test]
    fn test_mark_invoiced_once() {
        let mut d = debtor();
        assert!(d.mark_invoiced(BatchStatus::NotaIssued));
        assert!(!d.mark_invoiced(BatchStatus::NotaIssued));
        assert_eq!(d.invoice_status, DebtorInvoiceStatus::Invoiced);
    }

    #[test]
    fn test_mark_settled() {
        let mut d = debtor();
        d.mark_settled(BatchStatus::Paid);
        assert!(d.is_settled());
        assert!(d.outstanding_amount.is_zero());
    }
}
