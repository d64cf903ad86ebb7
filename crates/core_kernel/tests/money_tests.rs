//! Tests for the Money module
//!
//! Covers construction, currency-checked arithmetic, allocation and the
//! serialized form used on the wire.

use core_kernel::{Currency, Money, MoneyError, Rate};
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789), Currency::USD);
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_from_minor_respects_currency_scale() {
        assert_eq!(Money::from_minor(10050, Currency::IDR).amount(), dec!(100.50));
        assert_eq!(Money::from_minor(10000, Currency::JPY).amount(), dec!(10000));
    }

    #[test]
    fn test_zero_is_neither_positive_nor_negative() {
        let m = Money::zero(Currency::IDR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }

    #[test]
    fn test_round_to_currency() {
        let m = Money::new(dec!(10.4567), Currency::IDR).round_to_currency();
        assert_eq!(m.amount(), dec!(10.46));

        let yen = Money::new(dec!(10.5), Currency::JPY).round_to_currency();
        assert_eq!(yen.amount(), dec!(10));
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_sub_can_go_negative() {
        let short = Money::idr(dec!(9000000))
            .checked_sub(&Money::idr(dec!(10000000)))
            .unwrap();

        assert!(short.is_negative());
        assert_eq!(short.abs(), Money::idr(dec!(1000000)));
        assert!(short.floor_zero().is_zero());
    }

    #[test]
    fn test_checked_max_picks_larger() {
        let a = Money::idr(dec!(50000));
        let b = Money::idr(dec!(100000));
        assert_eq!(a.checked_max(&b).unwrap(), b);
    }

    #[test]
    fn test_mixed_currencies_are_rejected() {
        let idr = Money::idr(dec!(1));
        let sgd = Money::new(dec!(1), Currency::SGD);

        assert_eq!(
            idr.checked_sub(&sgd),
            Err(MoneyError::CurrencyMismatch("IDR".to_string(), "SGD".to_string()))
        );
        assert!(idr.checked_max(&sgd).is_err());
    }

    #[test]
    fn test_sum_of_empty_is_zero() {
        let total = Money::sum(Currency::IDR, std::iter::empty()).unwrap();
        assert!(total.is_zero());
        assert_eq!(total.currency(), Currency::IDR);
    }

    #[test]
    fn test_sum_stops_at_foreign_currency() {
        let items = [Money::idr(dec!(1)), Money::new(dec!(1), Currency::USD)];
        assert!(Money::sum(Currency::IDR, items.iter()).is_err());
    }

    #[test]
    fn test_operators_and_negation() {
        let total = Money::idr(dec!(4000000)) + Money::idr(dec!(6000000));
        assert_eq!(total, Money::idr(dec!(10000000)));
        assert_eq!(-total, Money::idr(dec!(-10000000)));
        assert_eq!(total - Money::idr(dec!(1)), Money::idr(dec!(9999999)));
    }
}

mod allocation {
    use super::*;

    #[test]
    fn test_weighted_split_follows_premiums() {
        let paid = Money::idr(dec!(10000000));
        let parts = paid
            .allocate_by_ratios(&[dec!(4000000), dec!(6000000)])
            .unwrap();

        assert_eq!(parts, vec![Money::idr(dec!(4000000)), Money::idr(dec!(6000000))]);
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let result = Money::idr(dec!(100)).allocate_by_ratios(&[dec!(1), dec!(-1)]);
        assert!(matches!(result, Err(MoneyError::InvalidAmount(_))));
    }

    #[test]
    fn test_empty_weights_are_rejected() {
        let result = Money::idr(dec!(100)).allocate_by_ratios(&[]);
        assert!(matches!(result, Err(MoneyError::InvalidAmount(_))));
    }

    #[test]
    fn test_single_weight_takes_everything() {
        let parts = Money::idr(dec!(123.45)).allocate_by_ratios(&[dec!(7)]).unwrap();
        assert_eq!(parts, vec![Money::idr(dec!(123.45))]);
    }
}

mod rate {
    use super::*;

    #[test]
    fn test_percentage_round_trip() {
        let rate = Rate::from_percentage(dec!(1));
        assert_eq!(rate.as_decimal(), dec!(0.01));
        assert_eq!(rate.as_percentage(), dec!(1));
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_currency_serializes_as_code() {
        let json = serde_json::to_string(&Currency::IDR).unwrap();
        assert_eq!(json, "\"IDR\"");
        assert_eq!(Currency::EUR.symbol(), "€");
    }

    #[test]
    fn test_money_json_shape() {
        let value = serde_json::to_value(Money::idr(dec!(2500))).unwrap();
        assert_eq!(value["currency"], "IDR");

        let back: Money = serde_json::from_value(value).unwrap();
        assert_eq!(back, Money::idr(dec!(2500)));
    }
}
