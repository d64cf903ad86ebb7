//! Request handlers

pub mod health;
pub mod batches;
pub mod debtors;
pub mod notas;
pub mod payments;
pub mod adjustments;
pub mod claims;
pub mod audit;
