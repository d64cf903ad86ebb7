//! Tests for actors, roles and kernel errors

use core_kernel::{Actor, CoreError, MoneyError, Role};

#[test]
fn test_role_parse_is_lenient_about_case_and_whitespace() {
    assert_eq!(" Finance ".parse::<Role>().unwrap(), Role::Finance);
    assert_eq!("BRANCH_OPERATOR".parse::<Role>().unwrap(), Role::BranchOperator);
}

#[test]
fn test_unknown_role_is_rejected() {
    match " Auditor ".parse::<Role>() {
        Err(CoreError::UnknownRole(name)) => assert_eq!(name, "auditor"),
        other => panic!("Expected UnknownRole error, got {:?}", other),
    }
    let error = CoreError::UnknownRole("auditor".to_string());
    assert_eq!(error.to_string(), "Unknown role: auditor");
}

#[test]
fn test_role_serializes_snake_case() {
    let json = serde_json::to_string(&Role::BranchOperator).unwrap();
    assert_eq!(json, "\"branch_operator\"");
}

#[test]
fn test_actor_display() {
    let actor = Actor::new("uw@reinsurer.co.id", Role::Underwriter);
    assert_eq!(actor.to_string(), "uw@reinsurer.co.id (underwriter)");
}

#[test]
fn test_only_manager_and_admin_are_elevated() {
    assert!(!Role::BranchOperator.is_elevated());
    assert!(!Role::Underwriter.is_elevated());
    assert!(!Role::Counterparty.is_elevated());
}

#[test]
fn test_core_error_from_money_error() {
    let error: CoreError = MoneyError::DivisionByZero.into();
    assert!(matches!(error, CoreError::Money(MoneyError::DivisionByZero)));
    assert_eq!(error.to_string(), "Money error: Division by zero");
}

#[test]
fn test_core_error_not_found_message() {
    let error = CoreError::not_found("batch BAT-1");
    assert_eq!(error.to_string(), "Not found: batch BAT-1");
}
