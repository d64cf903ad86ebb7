//! Notification dispatchers
//!
//! [`TracingNotificationDispatcher`] writes every notification to the log;
//! it is what the API server runs with until a mail gateway is wired in.
//! [`RecordingNotificationDispatcher`] keeps them for inspection.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use core_kernel::{DomainPort, PortError, Role};
use domain_settlement::{Notification, NotificationDispatcher, TemplatedEmail};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationDispatcher;

impl DomainPort for TracingNotificationDispatcher {}

#[async_trait]
impl NotificationDispatcher for TracingNotificationDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), PortError> {
        info!(
            target: "notifications",
            title = %notification.title,
            role = %notification.target_role,
            module = %notification.module,
            reference = %notification.reference_id,
            severity = ?notification.severity,
            "{}",
            notification.message
        );
        Ok(())
    }

    async fn send_templated(&self, email: TemplatedEmail) -> Result<(), PortError> {
        info!(
            target: "notifications",
            template = %email.template_key,
            role = %email.target_role,
            variables = ?email.variables,
            "templated email"
        );
        Ok(())
    }
}

/// Keeps every notification and email it is handed
#[derive(Default)]
pub struct RecordingNotificationDispatcher {
    notifications: RwLock<Vec<Notification>>,
    emails: RwLock<Vec<TemplatedEmail>>,
    unavailable: AtomicBool,
}

impl RecordingNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable, every send fails and nothing is recorded
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    pub async fn emails(&self) -> Vec<TemplatedEmail> {
        self.emails.read().await.clone()
    }

    pub async fn emails_for(&self, role: Role) -> Vec<TemplatedEmail> {
        self.emails
            .read()
            .await
            .iter()
            .filter(|e| e.target_role == role)
            .cloned()
            .collect()
    }

    pub async fn email_with_template(&self, template_key: &str) -> Option<TemplatedEmail> {
        self.emails
            .read()
            .await
            .iter()
            .rev()
            .find(|e| e.template_key == template_key)
            .cloned()
    }

    fn check_available(&self) -> Result<(), PortError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::connection("notification gateway unavailable"));
        }
        Ok(())
    }
}

impl DomainPort for RecordingNotificationDispatcher {}

#[async_trait]
impl NotificationDispatcher for RecordingNotificationDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), PortError> {
        self.check_available()?;
        self.notifications.write().await.push(notification);
        Ok(())
    }

    async fn send_templated(&self, email: TemplatedEmail) -> Result<(), PortError> {
        self.check_available()?;
        self.emails.write().await.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_settlement::Severity;

    #[tokio::test]
    async fn test_recording_dispatcher_keeps_emails_by_role() {
        let dispatcher = RecordingNotificationDispatcher::new();
        dispatcher
            .send_templated(TemplatedEmail::transition("Nota", "Confirmed", "Paid", Role::BranchOperator))
            .await
            .unwrap();
        dispatcher
            .send_templated(TemplatedEmail::transition("Batch", "Uploaded", "Validated", Role::Underwriter))
            .await
            .unwrap();

        assert_eq!(dispatcher.emails_for(Role::Underwriter).await.len(), 1);
        assert!(dispatcher.email_with_template("nota_paid").await.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_dispatcher_records_nothing() {
        let dispatcher = RecordingNotificationDispatcher::new();
        dispatcher.set_unavailable(true);

        let result = dispatcher
            .notify(Notification {
                title: "t".into(),
                message: "m".into(),
                severity: Severity::Info,
                module: "nota".into(),
                reference_id: "NOTA-1".into(),
                target_role: Role::Finance,
            })
            .await;
        assert!(result.is_err());
        assert!(dispatcher.notifications().await.is_empty());
    }
}
