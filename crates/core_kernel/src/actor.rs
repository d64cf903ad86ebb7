//! Acting identity threaded through every workflow call
//!
//! There is no ambient "current user": each operation receives the actor
//! explicitly, and the orchestrator decides what that actor may do.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Operational roles of the back office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ceding branch staff: uploads batches, revises debtors, submits claims
    BranchOperator,
    /// Reinsurer underwriting: validates batches, decides debtors
    Underwriter,
    /// Finance: notas, payment intents, payments, reconciliation
    Finance,
    /// Supervisory role on the originating side
    Manager,
    /// The counter-party that acknowledges adjustment notes
    Counterparty,
    /// System administrator
    Admin,
}

impl Role {
    /// Elevated roles may resolve reopen requests and approve payment intents
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::BranchOperator => "branch_operator",
            Role::Underwriter => "underwriter",
            Role::Finance => "finance",
            Role::Manager => "manager",
            Role::Counterparty => "counterparty",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "branch_operator" => Ok(Role::BranchOperator),
            "underwriter" => Ok(Role::Underwriter),
            "finance" => Ok(Role::Finance),
            "manager" => Ok(Role::Manager),
            "counterparty" => Ok(Role::Counterparty),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// The person (or system account) performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.email, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_round_trip() {
        for role in [
            Role::BranchOperator,
            Role::Underwriter,
            Role::Finance,
            Role::Manager,
            Role::Counterparty,
            Role::Admin,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!("auditor".parse::<Role>().is_err());
    }

    #[test]
    fn test_elevated_roles() {
        assert!(Role::Manager.is_elevated());
        assert!(Role::Admin.is_elevated());
        assert!(!Role::Finance.is_elevated());
    }
}
