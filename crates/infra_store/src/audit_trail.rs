//! In-memory audit trail

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, PortError};
use domain_settlement::{AuditEntry, AuditTrail};

/// Append-only list of audit entries
#[derive(Default)]
pub struct InMemoryAuditTrail {
    entries: RwLock<Vec<AuditEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable, every append fails
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn blocked(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.is_blocked())
            .cloned()
            .collect()
    }
}

impl DomainPort for InMemoryAuditTrail {}

#[async_trait]
impl AuditTrail for InMemoryAuditTrail {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::connection("audit trail unavailable"));
        }
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
