//! Test Data Builders
//!
//! Builders for batch uploads and payment receipts. Tests set only what
//! they care about; the rest defaults to a one-debtor rupiah batch.

use chrono::NaiveDate;
use core_kernel::{ContractId, Currency, InvoiceId, Money};
use domain_settlement::{BatchIntake, DebtorRecord, PaymentReceipt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::IdFixtures;

/// Builder for batch uploads
pub struct BatchIntakeBuilder {
    contract_id: ContractId,
    contract_reference: String,
    month: u32,
    year: i32,
    currency: Currency,
    debtors: Vec<DebtorRecord>,
}

impl Default for BatchIntakeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchIntakeBuilder {
    pub fn new() -> Self {
        Self {
            contract_id: IdFixtures::contract_id(),
            contract_reference: "TREATY-QS-2024".to_string(),
            month: 3,
            year: 2024,
            currency: Currency::IDR,
            debtors: Vec::new(),
        }
    }

    pub fn with_contract(mut self, contract_id: ContractId) -> Self {
        self.contract_id = contract_id;
        self
    }

    pub fn with_period(mut self, month: u32, year: i32) -> Self {
        self.month = month;
        self.year = year;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Adds a debtor whose net premium is `premium`
    ///
    /// The credit plafond is a hundred times the premium and the gross
    /// premium carries a 10% commission on top.
    pub fn with_debtor(mut self, name: impl Into<String>, premium: Decimal) -> Self {
        let currency = self.currency;
        self.debtors.push(DebtorRecord {
            name: name.into(),
            credit_plafond: Money::new(premium * dec!(100), currency),
            gross_premium: Money::new(premium * dec!(1.1), currency),
            net_premium: Money::new(premium, currency),
        });
        self
    }

    /// Adds one debtor per premium, named `Debtor 1`, `Debtor 2`, ...
    pub fn with_premiums(mut self, premiums: &[Decimal]) -> Self {
        for (i, premium) in premiums.iter().enumerate() {
            self = self.with_debtor(format!("Debtor {}", i + 1), *premium);
        }
        self
    }

    pub fn with_record(mut self, record: DebtorRecord) -> Self {
        self.debtors.push(record);
        self
    }

    pub fn build(self) -> BatchIntake {
        let debtors = if self.debtors.is_empty() {
            vec![DebtorRecord {
                name: "PT Sinar Jaya".to_string(),
                credit_plafond: Money::new(dec!(1000000000), self.currency),
                gross_premium: Money::new(dec!(11000000), self.currency),
                net_premium: Money::new(dec!(10000000), self.currency),
            }]
        } else {
            self.debtors
        };

        BatchIntake {
            contract_id: self.contract_id,
            contract_reference: self.contract_reference,
            month: self.month,
            year: self.year,
            currency: self.currency,
            debtors,
        }
    }
}

/// Builder for bank receipts
pub struct PaymentReceiptBuilder {
    contract_id: ContractId,
    invoice_id: Option<InvoiceId>,
    amount: Money,
    received_date: NaiveDate,
    bank_reference: Option<String>,
}

impl PaymentReceiptBuilder {
    pub fn new(contract_id: ContractId, amount: Money) -> Self {
        Self {
            contract_id,
            invoice_id: None,
            amount,
            received_date: IdFixtures::today(),
            bank_reference: None,
        }
    }

    pub fn for_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    pub fn received_on(mut self, date: NaiveDate) -> Self {
        self.received_date = date;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.bank_reference = Some(reference.into());
        self
    }

    pub fn build(self) -> PaymentReceipt {
        PaymentReceipt {
            contract_id: self.contract_id,
            invoice_id: self.invoice_id,
            amount: self.amount,
            received_date: self.received_date,
            bank_reference: self.bank_reference,
        }
    }
}
