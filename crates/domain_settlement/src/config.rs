//! Settlement configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{CoreError, Currency, Money, Rate};
use domain_billing::TolerancePolicy;

/// Tunables of the settlement workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Currency the tolerance amounts are expressed in
    pub currency: Currency,
    /// Relative reconciliation tolerance (0.01 = 1%)
    pub tolerance_rate: Decimal,
    /// Absolute floor of the tolerance band
    pub tolerance_floor: Decimal,
    /// Largest residual an operator may close by hand
    pub close_threshold: Decimal,
    /// Retries per saga step on conflicts and transient store errors
    pub max_step_retries: u32,
    /// Days between nota confirmation and the planned payment date
    pub payment_term_days: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: Currency::IDR,
            tolerance_rate: dec!(0.01),
            tolerance_floor: dec!(100000),
            close_threshold: dec!(100000),
            max_step_retries: 3,
            payment_term_days: 30,
        }
    }
}

impl SettlementConfig {
    /// Rejects settings under which a manual close could land outside the
    /// band the settlement cascade closes on
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tolerance_rate.is_sign_negative() || self.tolerance_rate >= Decimal::ONE {
            return Err(CoreError::validation("tolerance_rate must be in [0, 1)"));
        }
        if self.tolerance_floor.is_sign_negative() || self.close_threshold.is_sign_negative() {
            return Err(CoreError::validation("tolerance amounts must not be negative"));
        }
        if self.close_threshold > self.tolerance_floor {
            return Err(CoreError::validation(
                "close_threshold must not exceed tolerance_floor",
            ));
        }
        Ok(())
    }

    pub fn tolerance_policy(&self) -> TolerancePolicy {
        TolerancePolicy {
            rate: Rate::new(self.tolerance_rate),
            floor: Money::new(self.tolerance_floor, self.currency),
            close_threshold: Money::new(self.close_threshold, self.currency),
        }
    }
}
