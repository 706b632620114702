use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pool::{MailboxClass, PoolType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingSettings {
    pub daily_limit: i32,
    pub min_time_gap_seconds: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomizeRange {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupSettings {
    pub daily_emails: i32,
    pub ramp_up: bool,
    pub ramp_up_value: i32,
    pub randomize: RandomizeRange,
    pub reply_rate: i32,
    pub weekdays_only: bool,
}

/// One completed placement-test score, kept in a domain's bounded history
/// (spec §3 invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestHistoryEntry {
    pub test_id: String,
    pub completed_at: DateTime<Utc>,
    pub score: u8,
    pub inbox_percent: u8,
    pub spam_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSchedule {
    pub next_test: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub average_score: f64,
    pub samples: usize,
    pub last_updated: DateTime<Utc>,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            average_score: 0.0,
            samples: 0,
            last_updated: Utc::now(),
        }
    }
}

/// One entry in a domain's rotation log, appended atomically with the pool
/// change it describes (spec §3 invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    pub at: DateTime<Utc>,
    pub from_pool: PoolType,
    pub to_pool: PoolType,
    pub action: String,
    pub reason: String,
    pub campaign_ids: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Drafted,
    Active,
    Completed,
    Stopped,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRef {
    pub campaign_id: String,
    pub status: CampaignStatus,
}

/// A sending identity (spec §3). Created in `InitialWarming`; mutated only by
/// `AutomationEngine`/`PoolManager`; never deleted outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub external_provider_id: String,
    pub pool_type: PoolType,
    pub mailbox_class: MailboxClass,
    pub sending_settings: SendingSettings,
    pub warmup_settings: WarmupSettings,
    pub health_score: u8,
    pub consecutive_low_scores: u32,
    pub pool_entry_date: DateTime<Utc>,
    pub test_schedule: TestSchedule,
    pub test_history: Vec<TestHistoryEntry>,
    pub health_metrics: HealthMetrics,
    pub rotation_log: Vec<RotationEvent>,
    pub campaigns: Vec<CampaignRef>,
    pub active_test_id: Option<String>,
    /// Bumped on every persisted write; `Repository::upsert_domain` rejects
    /// a write whose `version` doesn't match the stored row (spec §4.2).
    pub version: u64,
}

pub const MAX_TEST_HISTORY: usize = 10;
pub const LOW_SCORE_THRESHOLD: u8 = 75;

impl Domain {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tenant_id: impl Into<String>,
        external_provider_id: impl Into<String>,
        mailbox_class: MailboxClass,
        now: DateTime<Utc>,
    ) -> Self {
        let (sending_settings, warmup_settings) =
            crate::presets::defaults_for(mailbox_class, PoolType::InitialWarming);
        Self {
            id: id.into(),
            name: name.into(),
            tenant_id: tenant_id.into(),
            external_provider_id: external_provider_id.into(),
            pool_type: PoolType::InitialWarming,
            mailbox_class,
            sending_settings,
            warmup_settings,
            health_score: 0,
            consecutive_low_scores: 0,
            pool_entry_date: now,
            test_schedule: TestSchedule { next_test: None },
            test_history: Vec::new(),
            health_metrics: HealthMetrics::default(),
            rotation_log: Vec::new(),
            campaigns: Vec::new(),
            active_test_id: None,
            version: 0,
        }
    }

    pub fn days_in_pool(&self, now: DateTime<Utc>) -> i64 {
        (now - self.pool_entry_date).num_days()
    }

    pub fn has_active_campaign(&self) -> bool {
        self.campaigns
            .iter()
            .any(|c| c.status == CampaignStatus::Active)
    }

    pub fn active_campaign_ids(&self) -> Vec<String> {
        self.campaigns
            .iter()
            .filter(|c| c.status == CampaignStatus::Active)
            .map(|c| c.campaign_id.clone())
            .collect()
    }

    /// Last `n` test scores, most recent first.
    pub fn last_scores(&self, n: usize) -> Vec<u8> {
        self.test_history
            .iter()
            .rev()
            .take(n)
            .map(|t| t.score)
            .collect()
    }

    pub fn mean_of_last(&self, n: usize) -> Option<f64> {
        let scores = self.last_scores(n);
        if scores.len() < n {
            return None;
        }
        Some(scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64)
    }

    /// Push a completed test, truncating to the last `MAX_TEST_HISTORY`
    /// entries (spec §3 invariant 2). Returns `false` if `test_id` is
    /// already present (idempotent ingest, spec §8).
    pub fn push_test_history(&mut self, entry: TestHistoryEntry) -> bool {
        if self.test_history.iter().any(|t| t.test_id == entry.test_id) {
            return false;
        }
        self.test_history.push(entry);
        if self.test_history.len() > MAX_TEST_HISTORY {
            let overflow = self.test_history.len() - MAX_TEST_HISTORY;
            self.test_history.drain(0..overflow);
        }
        true
    }

    /// Health score equals the rounded mean of the last <=3 scores
    /// (spec §3 invariant 8). Unlike `mean_of_last`, this is defined as
    /// soon as at least one score exists — a domain with only 1 or 2
    /// completed tests still gets a real score, not a stale 0.
    pub fn recompute_health_score(&mut self) {
        let scores = self.last_scores(3);
        if scores.is_empty() {
            return;
        }
        let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64;
        self.health_score = mean.round() as u8;
    }

    /// `consecutiveLowScores` resets to 0 on any score >= threshold, else +1
    /// (spec §3 invariant 6).
    pub fn update_consecutive_low_scores(&mut self, latest_score: u8) {
        if latest_score < LOW_SCORE_THRESHOLD {
            self.consecutive_low_scores += 1;
        } else {
            self.consecutive_low_scores = 0;
        }
    }

    pub fn apply_pool_change(&mut self, to: PoolType, now: DateTime<Utc>) {
        self.pool_type = to;
        self.pool_entry_date = now;
        self.consecutive_low_scores = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_at(now: DateTime<Utc>) -> Domain {
        Domain::new(
            "d1",
            "example.com",
            "tenant-1",
            "ext-1",
            MailboxClass::StandardMs,
            now,
        )
    }

    #[test]
    fn test_history_is_bounded_to_ten() {
        let now = Utc::now();
        let mut d = domain_at(now);
        for i in 0..15 {
            d.push_test_history(TestHistoryEntry {
                test_id: format!("t{i}"),
                completed_at: now,
                score: 80,
                inbox_percent: 80,
                spam_percent: 20,
            });
        }
        assert_eq!(d.test_history.len(), MAX_TEST_HISTORY);
        // Oldest entries were dropped, most recent kept.
        assert_eq!(d.test_history.last().unwrap().test_id, "t14");
        assert_eq!(d.test_history.first().unwrap().test_id, "t5");
    }

    #[test]
    fn duplicate_test_id_does_not_duplicate_history() {
        let now = Utc::now();
        let mut d = domain_at(now);
        let entry = TestHistoryEntry {
            test_id: "dup".into(),
            completed_at: now,
            score: 80,
            inbox_percent: 80,
            spam_percent: 20,
        };
        assert!(d.push_test_history(entry.clone()));
        assert!(!d.push_test_history(entry));
        assert_eq!(d.test_history.len(), 1);
    }

    #[test]
    fn health_score_is_rounded_mean_of_last_three() {
        let now = Utc::now();
        let mut d = domain_at(now);
        for score in [80, 85, 82, 86] {
            d.push_test_history(TestHistoryEntry {
                test_id: format!("t{score}"),
                completed_at: now,
                score,
                inbox_percent: score,
                spam_percent: 100 - score,
            });
        }
        d.recompute_health_score();
        // mean(82, 86, 85) = 84.33 -> 84
        assert_eq!(d.health_score, 84);
    }

    #[test]
    fn consecutive_low_scores_resets_on_high_score() {
        let now = Utc::now();
        let mut d = domain_at(now);
        d.update_consecutive_low_scores(60);
        d.update_consecutive_low_scores(70);
        assert_eq!(d.consecutive_low_scores, 2);
        d.update_consecutive_low_scores(80);
        assert_eq!(d.consecutive_low_scores, 0);
    }

    #[test]
    fn consecutive_low_scores_resets_on_pool_change() {
        let now = Utc::now();
        let mut d = domain_at(now);
        d.update_consecutive_low_scores(50);
        d.update_consecutive_low_scores(50);
        assert_eq!(d.consecutive_low_scores, 2);
        d.apply_pool_change(PoolType::Recovery, now);
        assert_eq!(d.consecutive_low_scores, 0);
    }

    #[test]
    fn pool_entry_date_updates_on_pool_change() {
        let now = Utc::now();
        let mut d = domain_at(now - chrono::Duration::days(30));
        let later = now;
        d.apply_pool_change(PoolType::ReadyWaiting, later);
        assert_eq!(d.pool_entry_date, later);
    }

    #[test]
    fn health_score_reflects_a_single_completed_test() {
        let now = Utc::now();
        let mut d = domain_at(now);
        d.push_test_history(TestHistoryEntry {
            test_id: "only".into(),
            completed_at: now,
            score: 90,
            inbox_percent: 90,
            spam_percent: 10,
        });
        d.recompute_health_score();
        assert_eq!(d.health_score, 90);
    }

    #[test]
    fn graduation_needs_three_scores_not_two() {
        let now = Utc::now();
        let mut d = domain_at(now);
        d.push_test_history(TestHistoryEntry {
            test_id: "a".into(),
            completed_at: now,
            score: 90,
            inbox_percent: 90,
            spam_percent: 10,
        });
        d.push_test_history(TestHistoryEntry {
            test_id: "b".into(),
            completed_at: now,
            score: 90,
            inbox_percent: 90,
            spam_percent: 10,
        });
        assert!(d.mean_of_last(3).is_none());
    }
}
