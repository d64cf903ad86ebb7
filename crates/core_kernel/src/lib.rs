//! Core Kernel - Foundational types shared by every settlement crate
//!
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - The acting identity (`Actor`, `Role`)
//! - The generic `EntityStore` port with optimistic versions and idempotency keys

pub mod money;
pub mod identifiers;
pub mod actor;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError, Rate};
pub use identifiers::{
    BatchId, DebtorId, ContractId, NotaId, InvoiceId, PaymentIntentId,
    PaymentId, AdjustmentId, ClaimId, AuditEventId,
};
pub use actor::{Actor, Role};
pub use ports::{
    PortError, DomainPort, Entity, EntityStore, Versioned, IdempotencyKey,
    CreateOutcome, Predicate,
};
pub use error::CoreError;
