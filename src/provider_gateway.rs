//! Thin contracts around the placement-test provider and the campaign
//! platform (spec §4.3, §6). Both are abstract collaborators; this module
//! defines the trait boundary plus a stub (in-memory, for tests) and an
//! HTTP-backed implementation grounded on the teacher's connector style
//! (`services/github_connector.rs`, `services/wellfound_connector.rs`):
//! `reqwest::Client`, small serde request/response structs, `tracing`
//! logging, no retry logic inside the client — retry lives in the
//! `JobQueue` (spec §4.4).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::placement_test::{DeliveredFolder, TestEmailRecord, TestProvider, TestStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub uuid: String,
    pub filter_phrase: String,
    pub test_emails: Vec<TestEmailRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub overall_score: Option<u8>,
    pub test_emails: Vec<TestEmailRecord>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait PlacementProvider: Send + Sync {
    async fn create_test(&self, domain_name: &str) -> EngineResult<TestDescriptor>;
    async fn get_test(&self, uuid: &str) -> EngineResult<TestResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailAccountType {
    Smtp,
    Gmail,
    Zoho,
    Outlook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAccountUpdate {
    pub message_per_day: i32,
    pub account_type: EmailAccountType,
    pub warmup_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettingsUpdate {
    pub follow_up_percentage: i32,
    pub track_settings: Vec<String>,
    pub stop_lead_settings: String,
    pub enable_ai_esp_matching: bool,
    pub send_as_plain_text: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatusUpdate {
    Drafted,
    Active,
    Completed,
    Stopped,
    Paused,
}

#[async_trait]
pub trait CampaignPlatform: Send + Sync {
    async fn update_email_account(
        &self,
        external_account_id: &str,
        update: EmailAccountUpdate,
    ) -> EngineResult<()>;

    async fn update_campaign_settings(
        &self,
        campaign_id: &str,
        settings: CampaignSettingsUpdate,
    ) -> EngineResult<()>;

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatusUpdate,
    ) -> EngineResult<()>;

    /// Idempotent on `(campaign_id, to_external_id)`.
    async fn update_campaign_domain(
        &self,
        campaign_id: &str,
        from_external_id: &str,
        to_external_id: &str,
    ) -> EngineResult<()>;
}

// ============================================================================
// In-memory stubs, for tests and for hosts wiring the engine before a real
// provider integration lands.
// ============================================================================

pub struct StubPlacementProvider;

#[async_trait]
impl PlacementProvider for StubPlacementProvider {
    async fn create_test(&self, domain_name: &str) -> EngineResult<TestDescriptor> {
        Ok(TestDescriptor {
            uuid: uuid::Uuid::new_v4().to_string(),
            filter_phrase: format!("placement-check-{domain_name}"),
            test_emails: vec![
                TestEmailRecord {
                    address: format!("seed-google@{domain_name}"),
                    provider: TestProvider::Google,
                    folder: None,
                    status: TestStatus::Created,
                },
                TestEmailRecord {
                    address: format!("seed-ms@{domain_name}"),
                    provider: TestProvider::Microsoft,
                    folder: None,
                    status: TestStatus::Created,
                },
            ],
        })
    }

    async fn get_test(&self, _uuid: &str) -> EngineResult<TestResult> {
        Ok(TestResult {
            status: TestStatus::Completed,
            overall_score: Some(90),
            test_emails: vec![
                TestEmailRecord {
                    address: "seed-google@example.com".into(),
                    provider: TestProvider::Google,
                    folder: Some(DeliveredFolder::Inbox),
                    status: TestStatus::Completed,
                },
                TestEmailRecord {
                    address: "seed-ms@example.com".into(),
                    provider: TestProvider::Microsoft,
                    folder: Some(DeliveredFolder::Inbox),
                    status: TestStatus::Completed,
                },
            ],
            completed_at: Some(chrono::Utc::now()),
        })
    }
}

pub struct StubCampaignPlatform;

#[async_trait]
impl CampaignPlatform for StubCampaignPlatform {
    async fn update_email_account(
        &self,
        _external_account_id: &str,
        _update: EmailAccountUpdate,
    ) -> EngineResult<()> {
        Ok(())
    }

    async fn update_campaign_settings(
        &self,
        _campaign_id: &str,
        _settings: CampaignSettingsUpdate,
    ) -> EngineResult<()> {
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        _campaign_id: &str,
        _status: CampaignStatusUpdate,
    ) -> EngineResult<()> {
        Ok(())
    }

    async fn update_campaign_domain(
        &self,
        _campaign_id: &str,
        _from_external_id: &str,
        _to_external_id: &str,
    ) -> EngineResult<()> {
        Ok(())
    }
}

// ============================================================================
// HTTP-backed implementations
// ============================================================================

pub struct HttpPlacementProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPlacementProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PlacementProvider for HttpPlacementProvider {
    async fn create_test(&self, domain_name: &str) -> EngineResult<TestDescriptor> {
        let url = format!("{}/tests", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "domain": domain_name }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, domain = domain_name, "placement provider create_test failed");
                EngineError::transient(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::transient(format!(
                "placement provider returned {status}"
            )));
        }

        response
            .json::<TestDescriptor>()
            .await
            .map_err(|e| EngineError::transient(e.to_string()))
    }

    async fn get_test(&self, uuid: &str) -> EngineResult<TestResult> {
        let url = format!("{}/tests/{uuid}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, test = uuid, "placement provider get_test failed");
                EngineError::transient(e.to_string())
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::rate_limited("placement provider rate limit"));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::transient(format!(
                "placement provider returned {status}"
            )));
        }

        response
            .json::<TestResult>()
            .await
            .map_err(|e| EngineError::transient(e.to_string()))
    }
}

pub struct HttpCampaignPlatform {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCampaignPlatform {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> EngineResult<()> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, path, "campaign platform request failed");
                EngineError::transient(e.to_string())
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::rate_limited("campaign platform rate limit"));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::transient(format!(
                "campaign platform returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignPlatform for HttpCampaignPlatform {
    async fn update_email_account(
        &self,
        external_account_id: &str,
        update: EmailAccountUpdate,
    ) -> EngineResult<()> {
        self.post(
            &format!("/email-accounts/{external_account_id}"),
            serde_json::to_value(update).unwrap_or_default(),
        )
        .await
    }

    async fn update_campaign_settings(
        &self,
        campaign_id: &str,
        settings: CampaignSettingsUpdate,
    ) -> EngineResult<()> {
        self.post(
            &format!("/campaigns/{campaign_id}/settings"),
            serde_json::to_value(settings).unwrap_or_default(),
        )
        .await
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatusUpdate,
    ) -> EngineResult<()> {
        self.post(
            &format!("/campaigns/{campaign_id}/status"),
            serde_json::json!({ "status": status }),
        )
        .await
    }

    async fn update_campaign_domain(
        &self,
        campaign_id: &str,
        from_external_id: &str,
        to_external_id: &str,
    ) -> EngineResult<()> {
        tracing::info!(
            campaign_id,
            from_external_id,
            to_external_id,
            "updating campaign domain"
        );
        self.post(
            &format!("/campaigns/{campaign_id}/domain"),
            serde_json::json!({ "from": from_external_id, "to": to_external_id }),
        )
        .await
    }
}
