//! Payment reconciliation
//!
//! Pure computations behind the reconciliation engine:
//!
//! - deriving a [`ReconciliationItem`] for a batch nota from the payments
//!   matched to it and the acknowledged debit/credit notes on it,
//! - the dual tolerance band `max(amount × rate, floor)`,
//! - choosing an approved intent for an unmatched payment,
//! - distributing a payment across debtors with the remainder going to the
//!   last one.
//!
//! Nothing here touches storage. The orchestrator loads the entities,
//! calls into this module and persists the outcome.

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{
    Actor, Currency, DebtorId, Entity, InvoiceId, Money, MoneyError, NotaId, Rate,
};

use crate::adjustment::DebitCreditNote;
use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::nota::Nota;
use crate::payment::Payment;
use crate::payment_intent::PaymentIntent;

/// Tolerance rules for matching and closing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TolerancePolicy {
    /// Relative band, applied to the expected amount
    pub rate: Rate,
    /// Absolute floor of the band
    pub floor: Money,
    /// Largest residual an operator may close by hand
    pub close_threshold: Money,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            rate: Rate::new(dec!(0.01)),
            floor: Money::idr(dec!(100000)),
            close_threshold: Money::idr(dec!(100000)),
        }
    }
}

impl TolerancePolicy {
    pub fn currency(&self) -> Currency {
        self.floor.currency()
    }

    /// `max(|expected| × rate, floor)`
    pub fn tolerance_for(&self, expected: &Money) -> Result<Money, MoneyError> {
        self.rate.apply(&expected.abs()).checked_max(&self.floor)
    }

    pub fn is_within(&self, residual: &Money, expected: &Money) -> Result<bool, MoneyError> {
        let tolerance = self.tolerance_for(expected)?;
        Ok(residual.abs().amount() <= tolerance.amount())
    }

    /// Fails with `ToleranceExceeded` unless `residual` may be closed by hand
    pub fn ensure_closable(&self, residual: &Money) -> Result<(), BillingError> {
        if residual.currency() != self.close_threshold.currency() {
            return Err(MoneyError::CurrencyMismatch(
                residual.currency().to_string(),
                self.close_threshold.currency().to_string(),
            )
            .into());
        }
        if residual.abs().amount() > self.close_threshold.amount() {
            return Err(BillingError::ToleranceExceeded {
                difference: residual.abs().to_string(),
                allowed: self.close_threshold.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    Open,
    Matched,
    Exception,
    Closed,
}

/// Persisted reconciliation state of one batch nota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub nota_id: NotaId,
    pub nota_number: String,
    pub status: ReconciliationStatus,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ReconciliationRecord {
    type Id = NotaId;
    const KIND: &'static str = "ReconciliationRecord";

    fn id(&self) -> NotaId {
        self.nota_id
    }
}

impl ReconciliationRecord {
    pub fn open(nota: &Nota) -> Self {
        Self {
            nota_id: nota.id,
            nota_number: nota.nota_number.clone(),
            status: ReconciliationStatus::Open,
            closed_by: None,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == ReconciliationStatus::Closed
    }

    /// Stores a freshly derived status; closed records stay closed
    ///
    /// Returns whether anything changed.
    pub fn refresh(&mut self, derived: ReconciliationStatus) -> bool {
        if self.is_closed() || self.status == derived {
            return false;
        }
        self.status = derived;
        self.updated_at = Utc::now();
        true
    }

    /// Returns `false` if it was already closed
    pub fn close(&mut self, actor: &Actor) -> bool {
        if self.is_closed() {
            return false;
        }
        let now = Utc::now();
        self.status = ReconciliationStatus::Closed;
        self.closed_by = Some(actor.email.clone());
        self.closed_at = Some(now);
        self.updated_at = now;
        true
    }
}

/// Derived reconciliation view of one batch nota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub nota_id: NotaId,
    pub nota_number: String,
    pub invoice_id: Option<InvoiceId>,
    pub nota_amount: Money,
    /// `nota_amount - sum(acknowledged notes)`, see [`Nota::effective_amount`]
    pub effective_amount: Money,
    pub payment_received: Money,
    /// `nota_amount - payment_received`
    pub difference: Money,
    /// `difference` minus acknowledged notes
    pub residual: Money,
    pub tolerance: Money,
    pub status: ReconciliationStatus,
    /// Outside tolerance while the nota is not yet paid
    pub has_exception: bool,
    /// Nothing received or acknowledged yet; independent of `status`
    pub awaiting_payment: bool,
}

impl ReconciliationItem {
    /// Derives the reconciliation view of `nota`
    ///
    /// Received money is the sum of matched payments tied to the nota or its
    /// invoice, plus matched payments on the same contract that carry no
    /// nota or invoice link at all.
    pub fn derive(
        nota: &Nota,
        invoice: Option<&Invoice>,
        payments: &[Payment],
        adjustments: &[DebitCreditNote],
        record: Option<&ReconciliationRecord>,
        policy: &TolerancePolicy,
    ) -> Result<Self, MoneyError> {
        let currency = nota.amount().currency();
        let invoice_id = invoice.map(|i| i.id);

        let counted = payments.iter().filter(|p| p.counts_as_received()).filter(|p| {
            p.nota_id == Some(nota.id)
                || (invoice_id.is_some() && p.invoice_id == invoice_id)
                || (p.contract_id == nota.contract_id
                    && p.nota_id.is_none()
                    && p.invoice_id.is_none())
        });
        let payment_received = Money::sum(currency, counted.map(|p| &p.amount))?;

        let difference = nota.amount().checked_sub(&payment_received)?;
        let acknowledged = DebitCreditNote::acknowledged_total(nota.id, currency, adjustments)?;
        let residual = difference.checked_sub(&acknowledged)?;
        let effective_amount = nota.effective_amount(adjustments)?;

        let tolerance = policy.tolerance_for(&nota.amount())?;
        let within = residual.abs().amount() <= tolerance.amount();

        let status = if record.map(|r| r.is_closed()).unwrap_or(false) {
            ReconciliationStatus::Closed
        } else if within {
            ReconciliationStatus::Matched
        } else {
            ReconciliationStatus::Exception
        };

        let has_exception = !within && !nota.is_paid();
        let awaiting_payment = payment_received.is_zero() && acknowledged.is_zero();

        Ok(Self {
            nota_id: nota.id,
            nota_number: nota.nota_number.clone(),
            invoice_id,
            nota_amount: nota.amount(),
            effective_amount,
            payment_received,
            difference,
            residual,
            tolerance,
            status,
            has_exception,
            awaiting_payment,
        })
    }

    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }
}

/// Picks the approved intent an unmatched payment settles
///
/// Candidates share the payment's contract and currency and plan an amount
/// within tolerance of the payment. The closest planned amount wins, then
/// the earliest planned date.
pub fn select_intent<'a>(
    payment: &Payment,
    intents: &'a [PaymentIntent],
    policy: &TolerancePolicy,
) -> Result<Option<&'a PaymentIntent>, MoneyError> {
    let mut best: Option<(&'a PaymentIntent, Money)> = None;

    for intent in intents.iter().filter(|i| i.is_matchable()) {
        if intent.contract_id != payment.contract_id
            || intent.planned_amount.currency() != payment.amount.currency()
        {
            continue;
        }

        let deviation = payment.amount.checked_sub(&intent.planned_amount)?.abs();
        if !policy.is_within(&deviation, &intent.planned_amount)? {
            continue;
        }

        let better = match &best {
            None => true,
            Some((current, current_deviation)) => {
                deviation.amount() < current_deviation.amount()
                    || (deviation == *current_deviation
                        && intent.planned_date < current.planned_date)
            }
        };
        if better {
            best = Some((intent, deviation));
        }
    }

    Ok(best.map(|(intent, _)| intent))
}

/// A debtor's part of a distributed payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtorShare {
    pub debtor_id: DebtorId,
    pub share: Money,
}

/// Splits `payment` across debtors in proportion to their weights
///
/// Shares are rounded to the currency's minor unit; the last debtor takes
/// the remainder so the shares always add up to the payment exactly.
pub fn distribute(
    payment: &Money,
    weights: &[(DebtorId, Money)],
) -> Result<Vec<DebtorShare>, BillingError> {
    if weights.is_empty() {
        return Err(BillingError::NoDistributionTargets);
    }

    let ratios: Vec<_> = weights.iter().map(|(_, w)| w.amount()).collect();
    let shares = payment.allocate_by_ratios(&ratios)?;

    Ok(weights
        .iter()
        .zip(shares)
        .map(|((debtor_id, _), share)| DebtorShare {
            debtor_id: *debtor_id,
            share,
        })
        .collect())
}
