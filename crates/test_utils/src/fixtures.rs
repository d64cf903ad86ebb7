//! Pre-built Test Fixtures
//!
//! Provides ready-to-use actors and amounts. Every fixture is deterministic
//! so expected values can be computed by hand.

use chrono::{NaiveDate, Utc};
use core_kernel::{Actor, ContractId, Currency, Money, Role};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// One actor per operational role
pub struct ActorFixtures;

impl ActorFixtures {
    /// Ceding branch staff
    pub fn branch() -> Actor {
        Actor::new("ops@branch.test", Role::BranchOperator)
    }

    /// Reinsurer underwriter
    pub fn underwriter() -> Actor {
        Actor::new("uw@reinsure.test", Role::Underwriter)
    }

    /// Finance officer
    pub fn finance() -> Actor {
        Actor::new("fin@reinsure.test", Role::Finance)
    }

    /// Supervisor who resolves reopen requests and reviews notes
    pub fn manager() -> Actor {
        Actor::new("mgr@branch.test", Role::Manager)
    }

    /// The ceding company's acknowledging contact
    pub fn counterparty() -> Actor {
        Actor::new("cp@cedant.test", Role::Counterparty)
    }

    pub fn admin() -> Actor {
        Actor::new("admin@reinsure.test", Role::Admin)
    }
}

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Rupiah amount
    pub fn idr(amount: Decimal) -> Money {
        Money::idr(amount)
    }

    /// Creates a USD amount for currency mismatch tests
    pub fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    /// A premium large enough that the relative tolerance band (1%) exceeds
    /// the absolute floor
    pub fn large_premium() -> Money {
        Money::idr(dec!(50000000))
    }
}

/// Fixture for dates and identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn contract_id() -> ContractId {
        ContractId::new()
    }

    /// Receipts dated today are never late against a fresh intent
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}
