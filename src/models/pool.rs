use serde::{Deserialize, Serialize};

/// The four lifecycle pools a domain can occupy (spec §3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    InitialWarming,
    ReadyWaiting,
    Active,
    Recovery,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::InitialWarming => "initial_warming",
            PoolType::ReadyWaiting => "ready_waiting",
            PoolType::Active => "active",
            PoolType::Recovery => "recovery",
        }
    }

    pub fn all() -> [PoolType; 4] {
        [
            PoolType::InitialWarming,
            PoolType::ReadyWaiting,
            PoolType::Active,
            PoolType::Recovery,
        ]
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxClass {
    StandardMs,
    SpecialMs,
    Custom,
}

/// Per-pool-type test cadence and graduation policy (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRules {
    /// Days between placement tests for domains in this pool.
    pub test_cadence_days: f64,
    pub score_threshold: u8,
    pub min_tests_for_graduation: usize,
    pub recovery_period_days: i64,
    pub notification_threshold: Option<u8>,
}

impl AutomationRules {
    pub fn for_pool(pool_type: PoolType) -> Self {
        let test_cadence_days = match pool_type {
            PoolType::Active => 3.5,
            _ => 21.0,
        };
        Self {
            test_cadence_days,
            score_threshold: 75,
            min_tests_for_graduation: 3,
            recovery_period_days: 21,
            notification_threshold: None,
        }
    }
}

/// Default sending/warmup/campaign settings applied to a pool's members
/// (spec §4.7 Presets). Exactly one `Pool` row exists per `PoolType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub pool_type: PoolType,
    pub sending_defaults: crate::models::domain::SendingSettings,
    pub warmup_defaults: crate::models::domain::WarmupSettings,
    pub automation_rules: AutomationRules,
    pub member_ids: Vec<String>,
}

impl Pool {
    pub fn new(pool_type: PoolType, mailbox_class: MailboxClass) -> Self {
        let (sending_defaults, warmup_defaults) =
            crate::presets::defaults_for(mailbox_class, pool_type);
        Self {
            pool_type,
            sending_defaults,
            warmup_defaults,
            automation_rules: AutomationRules::for_pool(pool_type),
            member_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub total_domains: usize,
    pub healthy_domains: usize,
    pub average_score: f64,
    pub risk_factors: Vec<String>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}
