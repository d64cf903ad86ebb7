//! Notifications
//!
//! Plain notifications go to a role's inbox; templated emails are rendered
//! by the dispatcher from a template key and variables. Both are
//! best-effort: failures are logged and swallowed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use core_kernel::{DomainPort, PortError, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub module: String,
    pub reference_id: String,
    pub target_role: Role,
}

/// A status-change email, keyed by entity kind and transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatedEmail {
    pub entity_kind: String,
    pub from_status: String,
    pub to_status: String,
    pub target_role: Role,
    pub template_key: String,
    pub variables: BTreeMap<String, String>,
}

impl TemplatedEmail {
    pub fn transition(
        entity_kind: &str,
        from_status: &str,
        to_status: &str,
        target_role: Role,
    ) -> Self {
        Self {
            entity_kind: entity_kind.to_string(),
            from_status: from_status.to_string(),
            to_status: to_status.to_string(),
            target_role,
            template_key: format!(
                "{}_{}",
                entity_kind.to_ascii_lowercase(),
                to_status.to_ascii_lowercase()
            ),
            variables: BTreeMap::new(),
        }
    }

    pub fn var(mut self, key: &str, value: impl ToString) -> Self {
        self.variables.insert(key.to_string(), value.to_string());
        self
    }
}

/// Port for outbound notifications
#[async_trait]
pub trait NotificationDispatcher: DomainPort {
    async fn notify(&self, notification: Notification) -> Result<(), PortError>;

    async fn send_templated(&self, email: TemplatedEmail) -> Result<(), PortError>;
}

/// Best-effort front of a [`NotificationDispatcher`]
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn notify(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        module: &str,
        reference_id: impl ToString,
        target_role: Role,
    ) {
        let notification = Notification {
            title: title.into(),
            message: message.into(),
            severity,
            module: module.to_string(),
            reference_id: reference_id.to_string(),
            target_role,
        };
        let reference = notification.reference_id.clone();
        if let Err(err) = self.dispatcher.notify(notification).await {
            warn!(reference = %reference, error = %err, "notification dropped");
        }
    }

    pub async fn email(&self, email: TemplatedEmail) {
        let key = email.template_key.clone();
        if let Err(err) = self.dispatcher.send_templated(email).await {
            warn!(template = %key, error = %err, "templated email dropped");
        }
    }
}
