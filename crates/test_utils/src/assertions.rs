//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for money and audit entries that
//! give more meaningful error messages than standard assertions.

use core_kernel::Money;
use domain_settlement::{Action, AuditEntry, AuditOutcome};

/// Asserts that two Money values are exactly equal, currency included
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Money amounts differ: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that money values sum to a total
///
/// # Panics
///
/// Panics on a currency mismatch or if the sum differs from the total
pub fn assert_money_sum(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts.iter())
        .unwrap_or_else(|e| panic!("Cannot sum parts: {}", e));
    assert_money_eq(&sum, total);
}

/// Asserts that an entry for `action` with the given outcome exists
pub fn assert_audited(entries: &[AuditEntry], action: Action, outcome: AuditOutcome) -> AuditEntry {
    entries
        .iter()
        .find(|e| e.action == action.as_str() && e.outcome == outcome)
        .cloned()
        .unwrap_or_else(|| {
            panic!(
                "No {:?} audit entry for {}; got: {:?}",
                outcome,
                action,
                entries
                    .iter()
                    .map(|e| format!("{} {:?}", e.action, e.outcome))
                    .collect::<Vec<_>>()
            )
        })
}

/// Asserts a blocked entry for `action` exists and carries a reason
pub fn assert_blocked(entries: &[AuditEntry], action: Action) -> AuditEntry {
    let entry = assert_audited(entries, action, AuditOutcome::Blocked);
    assert!(
        entry.reason.as_deref().map(|r| !r.is_empty()).unwrap_or(false),
        "Blocked {} entry has no reason",
        action
    );
    entry
}

/// Asserts that nothing was audited as blocked
pub fn assert_nothing_blocked(entries: &[AuditEntry]) {
    let blocked: Vec<_> = entries
        .iter()
        .filter(|e| e.is_blocked())
        .map(|e| format!("{} on {}: {:?}", e.action, e.entity_id, e.reason))
        .collect();
    assert!(blocked.is_empty(), "Unexpected blocked attempts: {:?}", blocked);
}
