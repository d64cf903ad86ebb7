//! Invoice management
//!
//! An invoice is the receivable raised when a nota is issued. It tracks how
//! much of the nota has actually been paid.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BatchId, ContractId, Entity, InvoiceId, Money, MoneyError, NotaId, PaymentId};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Invoice has been issued, nothing received
    Issued,
    /// Partial payment received
    PartiallyPaid,
    /// Fully paid
    Paid,
}

/// An invoice for one nota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Invoice number (human-readable)
    pub invoice_number: String,
    /// Nota this invoice bills
    pub nota_id: NotaId,
    /// Contract being billed
    pub contract_id: ContractId,
    /// Batch behind the nota, if it is a batch nota
    pub batch_id: Option<BatchId>,
    /// Total amount
    pub total_amount: Money,
    /// Amount paid
    pub paid_amount: Money,
    /// Never negative
    pub outstanding_amount: Money,
    /// Status
    pub status: InvoiceStatus,
    /// Payments already counted into `paid_amount`
    pub applied_payments: BTreeSet<PaymentId>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Entity for Invoice {
    type Id = InvoiceId;
    const KIND: &'static str = "Invoice";

    fn id(&self) -> InvoiceId {
        self.id
    }
}

impl Invoice {
    /// Creates an issued invoice for a nota
    ///
    /// # Arguments
    ///
    /// * `nota_id` - Nota being invoiced
    /// * `contract_id` - Contract being billed
    /// * `batch_id` - Batch behind a batch nota
    /// * `total_amount` - Nota amount
    pub fn issue(
        nota_id: NotaId,
        contract_id: ContractId,
        batch_id: Option<BatchId>,
        total_amount: Money,
    ) -> Self {
        let now = Utc::now();
        let id = InvoiceId::new_v7();

        Self {
            id,
            invoice_number: format!("INV-{}", &id.as_uuid().simple().to_string()[..12]),
            nota_id,
            contract_id,
            batch_id,
            total_amount,
            paid_amount: Money::zero(total_amount.currency()),
            outstanding_amount: total_amount,
            status: InvoiceStatus::Issued,
            applied_payments: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a payment against the invoice
    ///
    /// Returns `Ok(false)` when the payment was already counted.
    pub fn record_payment(&mut self, payment_id: PaymentId, amount: Money) -> Result<bool, MoneyError> {
        if self.applied_payments.contains(&payment_id) {
            return Ok(false);
        }

        self.paid_amount = self.paid_amount.checked_add(&amount)?;
        self.applied_payments.insert(payment_id);
        self.recalculate()?;
        Ok(true)
    }

    /// Settles the invoice in full
    ///
    /// Returns `false` if it was already paid.
    pub fn mark_paid(&mut self) -> bool {
        if self.status == InvoiceStatus::Paid {
            return false;
        }

        if self.paid_amount.amount() < self.total_amount.amount() {
            self.paid_amount = self.total_amount;
        }
        self.outstanding_amount = Money::zero(self.total_amount.currency());
        self.status = InvoiceStatus::Paid;
        self.updated_at = Utc::now();
        true
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// True once nothing is left to collect
    pub fn is_fully_covered(&self) -> bool {
        self.outstanding_amount.is_zero()
    }

    fn recalculate(&mut self) -> Result<(), MoneyError> {
        self.outstanding_amount = self.total_amount.checked_sub(&self.paid_amount)?.floor_zero();
        self.status = if self.outstanding_amount.is_zero() {
            InvoiceStatus::Paid
        } else if self.paid_amount.is_positive() {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Issued
        };
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice() -> Invoice {
        Invoice::issue(
            NotaId::new(),
            ContractId::new(),
            Some(BatchId::new()),
            Money::idr(dec!(10000000)),
        )
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut inv = invoice();
        inv.record_payment(PaymentId::new(), Money::idr(dec!(4000000))).unwrap();
        assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(inv.outstanding_amount, Money::idr(dec!(6000000)));

        inv.record_payment(PaymentId::new(), Money::idr(dec!(6000000))).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert!(inv.is_fully_covered());
    }

    #[test]
    fn test_overpayment_keeps_outstanding_at_zero() {
        let mut inv = invoice();
        inv.record_payment(PaymentId::new(), Money::idr(dec!(10500000))).unwrap();
        assert!(inv.outstanding_amount.is_zero());
        assert_eq!(inv.paid_amount, Money::idr(dec!(10500000)));
    }

    #[test]
    fn test_same_payment_counted_once() {
        let mut inv = invoice();
        let payment = PaymentId::new();
        assert!(inv.record_payment(payment, Money::idr(dec!(1000000))).unwrap());
        assert!(!inv.record_payment(payment, Money::idr(dec!(1000000))).unwrap());
        assert_eq!(inv.paid_amount, Money::idr(dec!(1000000)));
    }

    #[test]
    fn test_mark_paid_sets_paid_to_total() {
        let mut inv = invoice();
        inv.record_payment(PaymentId::new(), Money::idr(dec!(9950000))).unwrap();
        assert!(inv.mark_paid());
        assert_eq!(inv.paid_amount, inv.total_amount);
        assert!(inv.outstanding_amount.is_zero());
        assert!(!inv.mark_paid());
    }
}
