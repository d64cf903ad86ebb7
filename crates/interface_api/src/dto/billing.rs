//! Nota, payment and adjustment DTOs

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{ContractId, Currency, InvoiceId, Money, PaymentIntentId};
use domain_billing::{Invoice, Nota, PaymentIntent};
use domain_settlement::PaymentReceipt;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AdvanceNotaRequest {
    /// Bank reference of the transfer when the nota is marked paid
    #[validate(length(min = 1, max = 64))]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub contract_id: ContractId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Decimal,
    pub currency: Currency,
    /// Defaults to today
    pub received_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 64))]
    pub bank_reference: Option<String>,
}

impl From<RecordPaymentRequest> for PaymentReceipt {
    fn from(request: RecordPaymentRequest) -> Self {
        PaymentReceipt {
            contract_id: request.contract_id,
            invoice_id: request.invoice_id,
            amount: Money::new(request.amount, request.currency),
            received_date: request
                .received_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            bank_reference: request.bank_reference,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MatchPaymentRequest {
    pub intent_id: PaymentIntentId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OpenAdjustmentRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewAdjustmentRequest {
    pub approve: bool,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotaDetailResponse {
    pub nota: Nota,
    pub invoice: Option<Invoice>,
    pub intents: Vec<PaymentIntent>,
}
