//! Batch and debtor DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{ContractId, Currency, Money};
use domain_batch::{Batch, ReopenImpact, ReviewProgress, UnderwritingDecision};
use domain_settlement::{BatchIntake, BulkDecision, DebtorRecord};

#[derive(Debug, Deserialize, Validate)]
pub struct IngestBatchRequest {
    pub contract_id: ContractId,
    #[validate(length(min = 1, max = 100))]
    pub contract_reference: String,
    pub month: u32,
    pub year: i32,
    pub currency: Currency,
    #[validate(nested)]
    pub debtors: Vec<DebtorRow>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DebtorRow {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub credit_plafond: Decimal,
    pub gross_premium: Decimal,
    pub net_premium: Decimal,
}

impl From<IngestBatchRequest> for BatchIntake {
    fn from(request: IngestBatchRequest) -> Self {
        let currency = request.currency;
        BatchIntake {
            contract_id: request.contract_id,
            contract_reference: request.contract_reference,
            month: request.month,
            year: request.year,
            currency,
            debtors: request
                .debtors
                .into_iter()
                .map(|row| DebtorRecord {
                    name: row.name,
                    credit_plafond: Money::new(row.credit_plafond, currency),
                    gross_premium: Money::new(row.gross_premium, currency),
                    net_premium: Money::new(row.net_premium, currency),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestReopenRequest {
    #[validate(length(max = 1000))]
    pub reason: String,
    pub impact: ReopenImpact,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReopenRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DecideDebtorRequest {
    pub decision: UnderwritingDecision,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkDecideRequest {
    #[validate(length(min = 1, max = 500))]
    pub decisions: Vec<BulkDecision>,
}

/// Corrected figures for a debtor rejected in review
#[derive(Debug, Deserialize)]
pub struct ReviseDebtorRequest {
    pub currency: Currency,
    pub credit_plafond: Decimal,
    pub gross_premium: Decimal,
    pub net_premium: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BatchDetailResponse {
    pub batch: Batch,
    pub progress: ReviewProgress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(name: &str) -> DebtorRow {
        DebtorRow {
            name: name.to_string(),
            credit_plafond: dec!(100000000),
            gross_premium: dec!(1200000),
            net_premium: dec!(1000000),
        }
    }

    #[test]
    fn test_intake_carries_request_currency() {
        let request = IngestBatchRequest {
            contract_id: ContractId::new(),
            contract_reference: "TREATY-QS-2024".to_string(),
            month: 3,
            year: 2024,
            currency: Currency::USD,
            debtors: vec![row("PT Maju")],
        };
        assert!(request.validate().is_ok());

        let intake = BatchIntake::from(request);
        assert_eq!(intake.debtors[0].net_premium, Money::new(dec!(1000000), Currency::USD));
    }

    #[test]
    fn test_blank_debtor_name_is_rejected() {
        let request = IngestBatchRequest {
            contract_id: ContractId::new(),
            contract_reference: "TREATY-QS-2024".to_string(),
            month: 3,
            year: 2024,
            currency: Currency::IDR,
            debtors: vec![row("")],
        };
        assert!(request.validate().is_err());
    }
}
