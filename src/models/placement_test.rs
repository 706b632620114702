use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Created,
    WaitingForEmail,
    Received,
    NotReceived,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestProvider {
    Google,
    Microsoft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveredFolder {
    Inbox,
    Spam,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEmailRecord {
    pub address: String,
    pub provider: TestProvider,
    pub folder: Option<DeliveredFolder>,
    pub status: TestStatus,
}

/// A placement-test probe (spec §3). Test-email records are immutable once
/// `status == Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementTest {
    pub id: String,
    pub domain_id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TestStatus,
    pub test_emails: Vec<TestEmailRecord>,
    pub overall_score: Option<u8>,
    pub inbox_percent: Option<u8>,
    pub spam_percent: Option<u8>,
}

impl PlacementTest {
    pub fn new(id: impl Into<String>, domain_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            domain_id: domain_id.into(),
            created_at: now,
            completed_at: None,
            status: TestStatus::Created,
            test_emails: Vec::new(),
            overall_score: None,
            inbox_percent: None,
            spam_percent: None,
        }
    }
}
