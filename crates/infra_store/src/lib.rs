//! In-memory Infrastructure
//!
//! Adapters for the ports the settlement orchestrator depends on:
//!
//! - [`InMemoryEntityStore`]: versioned entity store with idempotency keys
//! - [`InMemoryAuditTrail`]: append-only audit trail
//! - [`TracingNotificationDispatcher`] and [`RecordingNotificationDispatcher`]
//!
//! [`InMemoryBackend`] wires one of each into a ready [`SettlementService`].
//!
//! ```rust,ignore
//! use infra_store::InMemoryBackend;
//! use domain_settlement::SettlementConfig;
//!
//! let backend = InMemoryBackend::new();
//! let service = backend.service(SettlementConfig::default());
//! ```
//!
//! [`SettlementService`]: domain_settlement::SettlementService

pub mod entity_store;
pub mod audit_trail;
pub mod dispatch;
pub mod backend;

pub use entity_store::InMemoryEntityStore;
pub use audit_trail::InMemoryAuditTrail;
pub use dispatch::{RecordingNotificationDispatcher, TracingNotificationDispatcher};
pub use backend::InMemoryBackend;
