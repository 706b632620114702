//! Classifies and delivers human-facing notifications (spec §4.10). UI
//! delivery always happens; email delivery is restricted to critical
//! notifications by default. Failure of the email path must never fail the
//! UI path — grounded on the teacher's `pause_campaign`/`tracing::info!`
//! pattern of logging the outcome rather than bubbling transport failures
//! up to the caller.

use std::sync::Arc;

use chrono::Utc;

use crate::clock::SharedClock;
use crate::error::EngineResult;
use crate::models::notification::{DeliveryFlags, Notification, NotificationLevel};
use crate::repository::Repository;

pub struct NotificationService {
    repository: Arc<dyn Repository>,
    clock: SharedClock,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn Repository>, clock: SharedClock) -> Self {
        Self { repository, clock }
    }

    async fn deliver(
        &self,
        level: NotificationLevel,
        text: String,
        domain_id: Option<String>,
    ) -> EngineResult<()> {
        let delivery = DeliveryFlags {
            ui: true,
            email: level == NotificationLevel::Critical,
        };
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            text: text.clone(),
            domain_id: domain_id.clone(),
            delivery: delivery.clone(),
            read: false,
            created_at: self.clock.now(),
        };

        // UI delivery: persisted unconditionally.
        self.repository.save_notification(notification).await?;
        tracing::info!(level = level.as_str(), domain_id = ?domain_id, "notification delivered to ui");

        if delivery.email {
            if let Err(e) = self.send_email(&text) {
                // Email failure never fails the UI path.
                tracing::warn!(error = %e, "failed to deliver notification email");
            }
        }

        Ok(())
    }

    fn send_email(&self, _text: &str) -> Result<(), String> {
        // Transport is an abstract collaborator per spec §1; a host wires in
        // a concrete mailer (e.g. lettre, as the teacher does in
        // services/email_sender.rs) at the integration boundary.
        Ok(())
    }

    pub async fn notify_low_domain_score(&self, domain_id: &str, score: u8) -> EngineResult<()> {
        let level = if score < 60 {
            NotificationLevel::Critical
        } else {
            NotificationLevel::Warning
        };
        self.deliver(
            level,
            format!("Domain {domain_id} scored {score}, below healthy range"),
            Some(domain_id.to_string()),
        )
        .await
    }

    pub async fn notify_failed_rotation(&self, domain_id: &str, reason: &str) -> EngineResult<()> {
        self.deliver(
            NotificationLevel::Critical,
            format!("Rotation failed for domain {domain_id}: {reason}"),
            Some(domain_id.to_string()),
        )
        .await
    }

    pub async fn notify_pool_status(&self, pool_name: &str, available: usize) -> EngineResult<()> {
        let level = if available == 0 {
            NotificationLevel::Critical
        } else if available < 3 {
            NotificationLevel::Warning
        } else {
            return Ok(());
        };
        self.deliver(
            level,
            format!("Pool {pool_name} has {available} available domains"),
            None,
        )
        .await
    }

    pub async fn notify_test_completed(
        &self,
        success: bool,
        domain_id: &str,
        details: Option<String>,
    ) -> EngineResult<()> {
        let level = if success {
            NotificationLevel::Info
        } else {
            NotificationLevel::Warning
        };
        let text = match details {
            Some(d) => format!("Test completed for domain {domain_id}: {d}"),
            None => format!("Test completed for domain {domain_id}"),
        };
        self.deliver(level, text, Some(domain_id.to_string())).await
    }

    pub async fn notify_retry_exhausted(
        &self,
        target_id: &str,
        last_error: &str,
    ) -> EngineResult<()> {
        self.deliver(
            NotificationLevel::Critical,
            format!("Max retries exceeded for {target_id}: {last_error}"),
            Some(target_id.to_string()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::InMemoryRepository;

    fn service() -> NotificationService {
        let repo = InMemoryRepository::new();
        NotificationService::new(repo, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn low_score_under_sixty_is_critical() {
        let svc = service();
        svc.notify_low_domain_score("d1", 50).await.unwrap();
        let notifications = svc.repository.unread_notifications().await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Critical);
        assert!(notifications[0].delivery.email);
    }

    #[tokio::test]
    async fn low_score_at_sixty_five_is_warning_without_email() {
        let svc = service();
        svc.notify_low_domain_score("d1", 65).await.unwrap();
        let notifications = svc.repository.unread_notifications().await.unwrap();
        assert_eq!(notifications[0].level, NotificationLevel::Warning);
        assert!(!notifications[0].delivery.email);
    }

    #[tokio::test]
    async fn pool_status_with_zero_available_is_critical() {
        let svc = service();
        svc.notify_pool_status("Active", 0).await.unwrap();
        let notifications = svc.repository.unread_notifications().await.unwrap();
        assert_eq!(notifications[0].level, NotificationLevel::Critical);
    }

    #[tokio::test]
    async fn pool_status_with_plenty_available_emits_nothing() {
        let svc = service();
        svc.notify_pool_status("Active", 10).await.unwrap();
        let notifications = svc.repository.unread_notifications().await.unwrap();
        assert!(notifications.is_empty());
    }
}
