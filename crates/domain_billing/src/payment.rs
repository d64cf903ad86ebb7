//! Payment receipts
//!
//! A payment is money actually received against a contract. It starts
//! unmatched and becomes matched once tied to an approved payment intent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    Actor, ContractId, Entity, InvoiceId, Money, MoneyError, NotaId, PaymentId, PaymentIntentId,
};

use crate::error::BillingError;
use crate::payment_intent::{PaymentIntent, PaymentType};

/// Matching state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    /// Received, not yet tied to an intent
    Received,
    /// Tied to an intent
    Matched,
    /// Tied to an intent but short of what was planned
    PartiallyMatched,
}

/// Why a payment deviates from its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionType {
    None,
    Under,
    Over,
    Partial,
    Late,
    #[serde(rename = "FX")]
    Fx,
}

impl ExceptionType {
    /// Classifies a payment against the intent it settles
    ///
    /// FX wins over everything else, then amount deviations beyond
    /// `tolerance`, then lateness.
    pub fn classify(
        payment: &Payment,
        intent: &PaymentIntent,
        tolerance: Money,
    ) -> Result<Self, MoneyError> {
        if payment.amount.currency() != intent.planned_amount.currency() {
            return Ok(ExceptionType::Fx);
        }

        let deviation = payment.amount.checked_sub(&intent.planned_amount)?;
        if deviation.abs().amount() > tolerance.amount() {
            if deviation.is_positive() {
                return Ok(ExceptionType::Over);
            }
            return Ok(match intent.payment_type {
                PaymentType::Full => ExceptionType::Under,
                PaymentType::Partial | PaymentType::Instalment => ExceptionType::Partial,
            });
        }

        if payment.received_date > intent.planned_date {
            return Ok(ExceptionType::Late);
        }

        Ok(ExceptionType::None)
    }
}

/// Where a payment record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentSource {
    /// Recorded by an operator from a bank statement
    Recorded,
    /// Created by the settlement cascade when a nota was marked paid
    Settlement,
}

/// A payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Paying contract
    pub contract_id: ContractId,
    /// Invoice being paid, once known
    pub invoice_id: Option<InvoiceId>,
    /// Nota being paid, once known
    pub nota_id: Option<NotaId>,
    /// Intent this payment was matched to
    pub intent_id: Option<PaymentIntentId>,
    /// Payment amount
    pub amount: Money,
    /// Value date on the bank statement
    pub received_date: NaiveDate,
    /// External reference (bank ref, transaction ID)
    pub bank_reference: Option<String>,
    pub match_status: MatchStatus,
    pub exception_type: ExceptionType,
    pub source: PaymentSource,
    pub matched_by: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
    /// Who recorded the payment
    pub recorded_by: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Entity for Payment {
    type Id = PaymentId;
    const KIND: &'static str = "Payment";

    fn id(&self) -> PaymentId {
        self.id
    }
}

impl Payment {
    /// Records an unmatched receipt
    ///
    /// # Arguments
    ///
    /// * `contract_id` - Paying contract
    /// * `invoice_id` - Invoice named on the remittance, if any
    /// * `amount` - Amount received
    /// * `received_date` - Value date
    pub fn received(
        contract_id: ContractId,
        invoice_id: Option<InvoiceId>,
        amount: Money,
        received_date: NaiveDate,
        actor: &Actor,
    ) -> Result<Self, BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidAmount(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }

        Ok(Self {
            id: PaymentId::new_v7(),
            contract_id,
            invoice_id,
            nota_id: None,
            intent_id: None,
            amount,
            received_date,
            bank_reference: None,
            match_status: MatchStatus::Received,
            exception_type: ExceptionType::None,
            source: PaymentSource::Recorded,
            matched_by: None,
            matched_at: None,
            recorded_by: actor.email.clone(),
            created_at: Utc::now(),
        })
    }

    /// The payment the settlement cascade writes for a paid invoice
    pub fn settlement(
        contract_id: ContractId,
        invoice_id: InvoiceId,
        nota_id: NotaId,
        amount: Money,
        bank_reference: Option<String>,
        actor: &Actor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new_v7(),
            contract_id,
            invoice_id: Some(invoice_id),
            nota_id: Some(nota_id),
            intent_id: None,
            amount,
            received_date: now.date_naive(),
            bank_reference,
            match_status: MatchStatus::Matched,
            exception_type: ExceptionType::None,
            source: PaymentSource::Settlement,
            matched_by: Some(actor.email.clone()),
            matched_at: Some(now),
            recorded_by: actor.email.clone(),
            created_at: now,
        }
    }

    /// Sets the external reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.bank_reference = Some(reference.into());
        self
    }

    pub fn is_unmatched(&self) -> bool {
        self.match_status == MatchStatus::Received
    }

    /// Ties this payment to an intent
    pub fn match_to(
        &mut self,
        intent: &PaymentIntent,
        exception_type: ExceptionType,
        actor: &Actor,
    ) -> Result<(), BillingError> {
        if !self.is_unmatched() {
            return Err(BillingError::invalid(
                "Payment",
                self.match_status,
                "payment is already matched",
            ));
        }

        self.intent_id = Some(intent.id);
        self.invoice_id = intent.invoice_id.or(self.invoice_id);
        self.nota_id = Some(intent.nota_id);
        self.exception_type = exception_type;
        self.match_status = match exception_type {
            ExceptionType::Under | ExceptionType::Partial => MatchStatus::PartiallyMatched,
            _ => MatchStatus::Matched,
        };
        self.matched_by = Some(actor.email.clone());
        self.matched_at = Some(Utc::now());
        Ok(())
    }

    /// Counts toward what a nota has received
    pub fn counts_as_received(&self) -> bool {
        matches!(
            self.match_status,
            MatchStatus::Matched | MatchStatus::PartiallyMatched
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Role};
    use rust_decimal_macros::dec;

    fn finance() -> Actor {
        Actor::new("fin@reinsure.test", Role::Finance)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn intent(contract_id: ContractId, planned: Money, payment_type: PaymentType) -> PaymentIntent {
        PaymentIntent::draft(NotaId::new(), None, contract_id, payment_type, planned, date(10))
            .unwrap()
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let result = Payment::received(ContractId::new(), None, Money::idr(dec!(-1)), date(1), &finance());
        assert!(matches!(result, Err(BillingError::InvalidAmount(_))));
    }

    #[test]
    fn test_classify_within_tolerance_on_time() {
        let contract = ContractId::new();
        let i = intent(contract, Money::idr(dec!(10000000)), PaymentType::Full);
        let p = Payment::received(contract, None, Money::idr(dec!(9950000)), date(9), &finance()).unwrap();

        let kind = ExceptionType::classify(&p, &i, Money::idr(dec!(100000))).unwrap();
        assert_eq!(kind, ExceptionType::None);
    }

    #[test]
    fn test_classify_deviations() {
        let contract = ContractId::new();
        let tolerance = Money::idr(dec!(100000));
        let full = intent(contract, Money::idr(dec!(10000000)), PaymentType::Full);
        let instalment = intent(contract, Money::idr(dec!(10000000)), PaymentType::Instalment);

        let short = Payment::received(contract, None, Money::idr(dec!(9000000)), date(9), &finance()).unwrap();
        assert_eq!(ExceptionType::classify(&short, &full, tolerance).unwrap(), ExceptionType::Under);
        assert_eq!(ExceptionType::classify(&short, &instalment, tolerance).unwrap(), ExceptionType::Partial);

        let over = Payment::received(contract, None, Money::idr(dec!(11000000)), date(9), &finance()).unwrap();
        assert_eq!(ExceptionType::classify(&over, &full, tolerance).unwrap(), ExceptionType::Over);

        let late = Payment::received(contract, None, Money::idr(dec!(10000000)), date(20), &finance()).unwrap();
        assert_eq!(ExceptionType::classify(&late, &full, tolerance).unwrap(), ExceptionType::Late);

        let usd = Payment::received(contract, None, Money::new(dec!(650), Currency::USD), date(9), &finance()).unwrap();
        assert_eq!(ExceptionType::classify(&usd, &full, tolerance).unwrap(), ExceptionType::Fx);
    }

    #[test]
    fn test_match_links_intent() {
        let contract = ContractId::new();
        let i = intent(contract, Money::idr(dec!(10000000)), PaymentType::Full);
        let mut p = Payment::received(contract, None, Money::idr(dec!(10000000)), date(9), &finance()).unwrap();

        p.match_to(&i, ExceptionType::None, &finance()).unwrap();
        assert_eq!(p.match_status, MatchStatus::Matched);
        assert_eq!(p.intent_id, Some(i.id));
        assert_eq!(p.nota_id, Some(i.nota_id));
        assert!(p.counts_as_received());
        assert!(p.match_to(&i, ExceptionType::None, &finance()).is_err());
    }
}
