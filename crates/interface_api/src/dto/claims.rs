//! Claims DTOs

use rust_decimal::Decimal;
use serde::Deserialize;

use core_kernel::{BatchId, Currency, DebtorId, Money};

#[derive(Debug, Deserialize)]
pub struct CreateClaimRequest {
    pub batch_id: BatchId,
    pub debtor_id: DebtorId,
    pub amount: Decimal,
    pub currency: Currency,
}

impl CreateClaimRequest {
    pub fn claim_amount(&self) -> Money {
        Money::new(self.amount, self.currency)
    }
}
