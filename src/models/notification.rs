use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Critical,
    Warning,
    Info,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Critical => "critical",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFlags {
    pub ui: bool,
    pub email: bool,
}

impl Default for DeliveryFlags {
    fn default() -> Self {
        // UI delivery always happens; email is opt-in per notification.
        Self { ui: true, email: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub text: String,
    pub domain_id: Option<String>,
    pub delivery: DeliveryFlags,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
