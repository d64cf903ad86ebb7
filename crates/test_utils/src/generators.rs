//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating upload data that maintains
//! domain invariants.

use core_kernel::Money;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Whole-rupiah premiums between 1,000 and 100,000,000
pub fn premium_strategy() -> impl Strategy<Value = Decimal> {
    (1_000i64..100_000_000i64).prop_map(Decimal::from)
}

/// Between one and eight debtor premiums
pub fn premiums_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(premium_strategy(), 1..8)
}

/// Rupiah amounts with up to two decimal places
pub fn idr_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..10_000_000_000i64).prop_map(|cents| Money::idr(Decimal::new(cents, 2)))
}

/// Fraction of an amount actually paid, from 50% to 150%
pub fn payment_ratio_strategy() -> impl Strategy<Value = Decimal> {
    (50i64..=150i64).prop_map(|percent| Decimal::new(percent, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_premiums_are_positive(premiums in premiums_strategy()) {
            prop_assert!(!premiums.is_empty());
            prop_assert!(premiums.iter().all(|p| p.is_sign_positive() && !p.is_zero()));
        }

        #[test]
        fn test_money_is_positive(money in idr_money_strategy()) {
            prop_assert!(money.is_positive());
        }
    }
}
