//! The settlement orchestrator
//!
//! [`SettlementService`] is split over several files, one per workflow;
//! this one holds the wiring and the guard helpers they share.

use std::sync::Arc;

use tracing::warn;

use core_kernel::Actor;
use domain_billing::TolerancePolicy;

use crate::audit::{AuditEntry, AuditRecorder, AuditTrail};
use crate::config::SettlementConfig;
use crate::error::WorkflowError;
use crate::locks::AggregateLocks;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::permissions::{can, Action};
use crate::saga::SagaExecutor;
use crate::store::Stores;

/// Entry point for every settlement workflow operation
#[derive(Clone)]
pub struct SettlementService {
    pub(crate) stores: Stores,
    pub(crate) audit: AuditRecorder,
    pub(crate) notifier: Notifier,
    pub(crate) locks: AggregateLocks,
    pub(crate) config: SettlementConfig,
    pub(crate) policy: TolerancePolicy,
    pub(crate) saga: SagaExecutor,
}

impl SettlementService {
    pub fn new(
        stores: Stores,
        audit_trail: Arc<dyn AuditTrail>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            stores,
            audit: AuditRecorder::new(audit_trail),
            notifier: Notifier::new(dispatcher),
            locks: AggregateLocks::new(),
            policy: config.tolerance_policy(),
            saga: SagaExecutor::new(config.max_step_retries),
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn tolerance_policy(&self) -> &TolerancePolicy {
        &self.policy
    }

    /// Fails with a role-based invalid transition, audited, unless permitted
    pub(crate) async fn permit(
        &self,
        actor: &Actor,
        action: Action,
        module: &str,
        entity_type: &str,
        entity_id: impl ToString,
    ) -> Result<(), WorkflowError> {
        if can(actor, action) {
            return Ok(());
        }

        let err = WorkflowError::role_not_permitted(actor.role, action);
        let entry = AuditEntry::blocked(action, module, entity_type, entity_id, actor);
        Err(self.blocked(entry, err).await)
    }

    /// Audits a blocked attempt and hands the error back
    pub(crate) async fn blocked(&self, entry: AuditEntry, err: WorkflowError) -> WorkflowError {
        warn!(
            action = %entry.action,
            entity = %entry.entity_type,
            entity_id = %entry.entity_id,
            actor = %entry.actor_email,
            reason = %err,
            "blocked"
        );
        self.audit.record(entry.with_reason(err.to_string())).await;
        err
    }

    /// Audits a blocked attempt if `result` is a guard failure
    ///
    /// Store errors pass through unaudited; they are not decisions.
    pub(crate) async fn guard<T>(
        &self,
        result: Result<T, WorkflowError>,
        entry: impl FnOnce() -> AuditEntry,
    ) -> Result<T, WorkflowError> {
        match result {
            Ok(value) => Ok(value),
            Err(err @ WorkflowError::Store(_)) => Err(err),
            Err(err) => Err(self.blocked(entry(), err).await),
        }
    }
}
