//! Ports for the generic entity store
//!
//! Every business entity (batch, debtor, nota, invoice, ...) is persisted
//! through the same [`EntityStore`] port. The store is transactionless: each
//! call is individually atomic, but calls do not compose into a larger
//! transaction. Two guarantees make multi-entity cascades safe anyway:
//!
//! - **Optimistic versions**: `update` only succeeds when the caller's
//!   expected version matches the stored one; otherwise `PortError::Conflict`.
//! - **Idempotency keys**: `create_once` stores at most one entity per
//!   natural business key, returning the existing one on replay.
//!
//! ```text
//!   orchestrator ──▶ EntityStore<Batch>   ──▶ adapter (in-memory, SQL, API…)
//!                ──▶ EntityStore<Nota>    ──▶ adapter
//!                ──▶ EntityStore<Payment> ──▶ adapter
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use thiserror::Error;

/// Error type for port operations
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// A validation error occurred
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// Optimistic version check failed or the key is already taken
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Timeout { .. })
    }

    /// Returns true for a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
///
/// Ports are shared across async tasks, so they must be thread-safe.
pub trait DomainPort: Send + Sync + 'static {}

/// A persistable business entity
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + fmt::Display + Send + Sync + 'static;

    /// Entity kind used in audit records and error messages
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
}

/// An entity together with the version it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<E> {
    pub version: u64,
    pub entity: E,
}

impl<E> Versioned<E> {
    pub fn new(version: u64, entity: E) -> Self {
        Self { version, entity }
    }

    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E> Deref for Versioned<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

/// Natural business key guarding a creation step
///
/// Keys are scoped by kind so that e.g. the settlement payment of an invoice
/// and the payment intent of a nota never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(scope: &str, key: impl fmt::Display) -> Self {
        Self(format!("{}:{}", scope, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of an idempotent creation
#[derive(Debug, Clone)]
pub enum CreateOutcome<E> {
    /// The entity did not exist and has been created
    Created(Versioned<E>),
    /// An entity with the same key already existed; nothing was written
    Existing(Versioned<E>),
}

impl<E> CreateOutcome<E> {
    pub fn was_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_inner(self) -> Versioned<E> {
        match self {
            CreateOutcome::Created(v) | CreateOutcome::Existing(v) => v,
        }
    }
}

/// Predicate used by [`EntityStore::filter`]
pub type Predicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// Generic typed repository
///
/// Implementations must make each call atomic on its own. Nothing here
/// provides cross-call transactions; callers compose calls into sagas.
#[async_trait]
pub trait EntityStore<E: Entity>: DomainPort {
    /// Fetches a single entity by id
    async fn get(&self, id: E::Id) -> Result<Versioned<E>, PortError>;

    /// Lists all entities of this kind
    async fn list(&self) -> Result<Vec<Versioned<E>>, PortError>;

    /// Lists the entities matching `predicate`
    async fn filter(&self, predicate: Predicate<'_, E>) -> Result<Vec<Versioned<E>>, PortError>;

    /// Creates a new entity; fails with `Conflict` if the id already exists
    async fn create(&self, entity: E) -> Result<Versioned<E>, PortError>;

    /// Creates the entity unless one was already created under `key`
    async fn create_once(
        &self,
        key: &IdempotencyKey,
        entity: E,
    ) -> Result<CreateOutcome<E>, PortError>;

    /// Replaces the stored entity if its version still equals `expected_version`
    async fn update(&self, entity: E, expected_version: u64) -> Result<Versioned<E>, PortError>;

    /// Creates several entities, each individually
    async fn bulk_create(&self, entities: Vec<E>) -> Result<Vec<Versioned<E>>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_not_found() {
        let error = PortError::not_found("Batch", "BAT-1");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert!(error.to_string().contains("Batch"));
    }

    #[test]
    fn test_conflict_is_not_transient() {
        let conflict = PortError::conflict("version 3 != 4");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());

        let timeout = PortError::Timeout {
            operation: "update".to_string(),
            duration_ms: 500,
        };
        assert!(timeout.is_transient());
    }

    #[test]
    fn test_idempotency_key_is_scoped() {
        let a = IdempotencyKey::new("settlement-payment", "INV-1");
        let b = IdempotencyKey::new("payment-intent", "INV-1");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "settlement-payment:INV-1");
    }

    #[test]
    fn test_create_outcome_into_inner() {
        let outcome = CreateOutcome::Existing(Versioned::new(2, "x"));
        assert!(!outcome.was_created());
        assert_eq!(outcome.into_inner().version, 2);
    }
}
