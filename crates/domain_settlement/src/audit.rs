//! Audit trail
//!
//! Every transition attempt leaves an entry, whether it went through or was
//! blocked. Appending is best-effort: a failing audit store is logged and
//! never fails or rolls back the transition itself.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use core_kernel::{Actor, AuditEventId, DomainPort, PortError, Role};

use crate::permissions::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Allowed,
    Blocked,
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEventId,
    pub action: String,
    pub module: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub actor_email: String,
    pub actor_role: Role,
    pub reason: Option<String>,
    pub outcome: AuditOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    fn new(
        outcome: AuditOutcome,
        action: Action,
        module: &str,
        entity_type: &str,
        entity_id: impl ToString,
        actor: &Actor,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            action: action.as_str().to_string(),
            module: module.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            old_value: None,
            new_value: None,
            actor_email: actor.email.clone(),
            actor_role: actor.role,
            reason: None,
            outcome,
            recorded_at: Utc::now(),
        }
    }

    pub fn allowed(
        action: Action,
        module: &str,
        entity_type: &str,
        entity_id: impl ToString,
        actor: &Actor,
    ) -> Self {
        Self::new(AuditOutcome::Allowed, action, module, entity_type, entity_id, actor)
    }

    pub fn blocked(
        action: Action,
        module: &str,
        entity_type: &str,
        entity_id: impl ToString,
        actor: &Actor,
    ) -> Self {
        Self::new(AuditOutcome::Blocked, action, module, entity_type, entity_id, actor)
    }

    pub fn with_change(mut self, old_value: impl Serialize, new_value: impl Serialize) -> Self {
        self.old_value = serde_json::to_value(old_value).ok();
        self.new_value = serde_json::to_value(new_value).ok();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.outcome == AuditOutcome::Blocked
    }
}

/// Port for the append-only audit store
#[async_trait]
pub trait AuditTrail: DomainPort {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError>;

    /// Entries recorded for one entity, oldest first
    async fn for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError>;
}

/// Best-effort front of an [`AuditTrail`]
#[derive(Clone)]
pub struct AuditRecorder {
    trail: Arc<dyn AuditTrail>,
}

impl AuditRecorder {
    pub fn new(trail: Arc<dyn AuditTrail>) -> Self {
        Self { trail }
    }

    /// Appends `entry`, logging instead of failing when the store is down
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();
        if let Err(err) = self.trail.append(entry).await {
            warn!(action = %action, entity_id = %entity_id, error = %err, "audit append failed");
        }
    }

    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>, PortError> {
        self.trail.for_entity(entity_type, entity_id).await
    }
}
