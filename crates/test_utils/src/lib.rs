//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! settlement test suite.
//!
//! # Modules
//!
//! - `fixtures`: Actors and amounts used across tests
//! - `builders`: Builder patterns for batch uploads and receipts
//! - `harness`: An in-memory service with shortcuts to common states
//! - `assertions`: Custom assertion helpers for money and audit entries
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod harness;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use harness::*;
pub use assertions::*;
pub use generators::*;
