//! Owns pool membership, settings application, graduation checks and
//! metrics aggregation (spec §4.8).

use std::sync::Arc;

use chrono::Utc;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::event_bus::{Event, EventBus, EventType};
use crate::models::domain::{CampaignStatus, Domain, RotationEvent};
use crate::models::pool::{AutomationRules, MailboxClass, Pool, PoolMetrics, PoolType};
use crate::presets;
use crate::rate_limiter::RateLimiter;
use crate::repository::Repository;
use crate::transition_rules::{self, TransitionDecision};

pub struct PoolManager {
    repository: Arc<dyn Repository>,
    event_bus: Arc<EventBus>,
    rate_limiter: Arc<RateLimiter>,
    clock: SharedClock,
    config: Config,
}

impl PoolManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        event_bus: Arc<EventBus>,
        rate_limiter: Arc<RateLimiter>,
        clock: SharedClock,
        config: Config,
    ) -> Self {
        Self {
            repository,
            event_bus,
            rate_limiter,
            clock,
            config,
        }
    }

    /// Upserts the single pool row for `pool_type` with its default
    /// automation rules (spec §4.8).
    pub async fn initialize_pool(
        &self,
        pool_type: PoolType,
        mailbox_class: MailboxClass,
    ) -> EngineResult<()> {
        let pool = Pool::new(pool_type, mailbox_class);
        self.repository.upsert_pool(pool).await
    }

    /// Rate-limit-gated. No-op (success) if the domain is already in
    /// `target` (spec §8 idempotence law). Appends a rotation event and
    /// publishes `RotationTriggered` otherwise.
    pub async fn transition_domain(
        &self,
        domain_id: &str,
        target: PoolType,
        reason: &str,
    ) -> EngineResult<Domain> {
        if !self.rate_limiter.try_acquire(domain_id) {
            return Err(EngineError::rate_limited(format!(
                "rate limit exceeded transitioning domain {domain_id}"
            )));
        }

        let current = self.repository.find_domain(domain_id).await?;
        if current.pool_type == target {
            return Ok(current);
        }

        let now = self.clock.now();
        let event = RotationEvent {
            at: now,
            from_pool: current.pool_type,
            to_pool: target,
            action: "rotated_out".to_string(),
            reason: reason.to_string(),
            campaign_ids: current.active_campaign_ids(),
            errors: Vec::new(),
        };

        let domain = self
            .repository
            .transition_domain_pool(domain_id, target, now, event)
            .await?;

        self.event_bus.publish(
            Event::new(EventType::RotationTriggered, domain_id, now)
                .with_field("from_pool", current.pool_type.as_str())
                .with_field("to_pool", target.as_str())
                .with_field("reason", reason),
        );

        Ok(domain)
    }

    /// Same as `transition_domain`, but carries explicit campaign ids and an
    /// error list, for use by `AutomationEngine::execute_rotation` where the
    /// event must record "with errors" (spec §4.9).
    pub async fn transition_domain_with_campaigns(
        &self,
        domain_id: &str,
        target: PoolType,
        reason: &str,
        campaign_ids: Vec<String>,
        errors: Vec<String>,
    ) -> EngineResult<Domain> {
        if !self.rate_limiter.try_acquire(domain_id) {
            return Err(EngineError::rate_limited(format!(
                "rate limit exceeded transitioning domain {domain_id}"
            )));
        }

        let current = self.repository.find_domain(domain_id).await?;
        if current.pool_type == target {
            return Ok(current);
        }

        let now = self.clock.now();
        let action = if errors.is_empty() {
            "rotated_out".to_string()
        } else {
            "rotated_out_with_errors".to_string()
        };
        let event = RotationEvent {
            at: now,
            from_pool: current.pool_type,
            to_pool: target,
            action,
            reason: reason.to_string(),
            campaign_ids,
            errors,
        };

        let domain = self
            .repository
            .transition_domain_pool(domain_id, target, now, event)
            .await?;

        self.event_bus.publish(
            Event::new(EventType::RotationTriggered, domain_id, now)
                .with_field("from_pool", current.pool_type.as_str())
                .with_field("to_pool", target.as_str())
                .with_field("reason", reason),
        );

        Ok(domain)
    }

    /// Merge-updates pool settings and cascades to member domains.
    pub async fn apply_pool_settings(
        &self,
        pool_type: PoolType,
        sending: Option<crate::models::domain::SendingSettings>,
        warmup: Option<crate::models::domain::WarmupSettings>,
    ) -> EngineResult<()> {
        let mut pool = self.repository.find_pool(pool_type).await?;
        if let Some(sending) = sending {
            presets::validate(&sending, &pool.warmup_defaults)?;
            pool.sending_defaults = sending;
        }
        if let Some(warmup) = warmup {
            presets::validate(&pool.sending_defaults, &warmup)?;
            pool.warmup_defaults = warmup;
        }

        let member_ids = pool.member_ids.clone();
        self.repository.upsert_pool(pool.clone()).await?;

        for member_id in member_ids {
            if let Ok(mut domain) = self.repository.find_domain(&member_id).await {
                domain.sending_settings = pool.sending_defaults.clone();
                domain.warmup_settings = pool.warmup_defaults.clone();
                self.repository.upsert_domain(domain).await?;
            }
        }
        Ok(())
    }

    pub async fn check_graduation(&self, domain_id: &str) -> EngineResult<TransitionDecision> {
        let domain = self.repository.find_domain(domain_id).await?;
        let now = self.clock.now();
        Ok(transition_rules::evaluate(&domain, now, &self.config))
    }

    /// "healthy" = healthScore >= min_health_score (default 75). Risk
    /// factors per spec §4.8.
    pub async fn get_pool_metrics(&self, pool_type: PoolType) -> EngineResult<PoolMetrics> {
        let domains = self.repository.domains_in_pool(pool_type).await?;
        let total_domains = domains.len();
        let min_health_score = self.config.health_warning;

        let healthy_domains = domains
            .iter()
            .filter(|d| d.health_score >= min_health_score)
            .count();

        let average_score = if total_domains == 0 {
            0.0
        } else {
            domains.iter().map(|d| d.health_score as f64).sum::<f64>() / total_domains as f64
        };

        let mut risk_factors = Vec::new();
        if total_domains > 0 && average_score < min_health_score as f64 {
            risk_factors.push("Low average health score".to_string());
        }
        if total_domains > 0 {
            let unhealthy_ratio =
                (total_domains - healthy_domains) as f64 / total_domains as f64;
            if unhealthy_ratio > 0.2 {
                risk_factors.push("High proportion of unhealthy domains".to_string());
            }
        }

        Ok(PoolMetrics {
            total_domains,
            healthy_domains,
            average_score,
            risk_factors,
            last_updated: self.clock.now(),
        })
    }
}

/// Unused by `PoolManager` directly but kept alongside it: used by
/// `AutomationEngine::execute_rotation` to pick a replacement (spec §4.9).
pub async fn find_replacement_domain(
    repository: &Arc<dyn Repository>,
    min_score: u8,
) -> EngineResult<Option<Domain>> {
    let mut candidates = repository.domains_in_pool(PoolType::ReadyWaiting).await?;
    candidates.retain(|d| d.health_metrics.average_score >= min_score as f64);
    candidates.sort_by(|a, b| {
        b.health_metrics
            .average_score
            .partial_cmp(&a.health_metrics.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(candidates.into_iter().next())
}

pub fn has_active_campaign(domain: &Domain) -> bool {
    domain
        .campaigns
        .iter()
        .any(|c| c.status == CampaignStatus::Active)
}

/// Rule constants kept alongside the engine for visibility (spec §4.6).
pub fn default_automation_rules(pool_type: PoolType) -> AutomationRules {
    AutomationRules::for_pool(pool_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::repository::InMemoryRepository;

    fn manager() -> (Arc<InMemoryRepository>, PoolManager) {
        let repo = InMemoryRepository::new();
        let clock: SharedClock = Arc::new(VirtualClock::new(Utc::now()));
        let bus = Arc::new(EventBus::new());
        let limiter = Arc::new(RateLimiter::new(clock.clone(), 1, 100));
        let manager = PoolManager::new(
            repo.clone() as Arc<dyn Repository>,
            bus,
            limiter,
            clock,
            Config::default(),
        );
        (repo, manager)
    }

    #[tokio::test]
    async fn transition_to_current_pool_is_noop() {
        let (repo, manager) = manager();
        let now = Utc::now();
        manager
            .initialize_pool(PoolType::InitialWarming, MailboxClass::StandardMs)
            .await
            .unwrap();
        repo.upsert_domain(Domain::new(
            "d1",
            "example.com",
            "tenant",
            "ext",
            MailboxClass::StandardMs,
            now,
        ))
        .await
        .unwrap();

        let domain = manager
            .transition_domain("d1", PoolType::InitialWarming, "noop")
            .await
            .unwrap();
        assert!(domain.rotation_log.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_defers_second_transition_in_same_window() {
        let (repo, manager) = manager();
        let now = Utc::now();
        manager
            .initialize_pool(PoolType::InitialWarming, MailboxClass::StandardMs)
            .await
            .unwrap();
        manager
            .initialize_pool(PoolType::ReadyWaiting, MailboxClass::StandardMs)
            .await
            .unwrap();
        repo.upsert_domain(Domain::new(
            "d1",
            "example.com",
            "tenant",
            "ext",
            MailboxClass::StandardMs,
            now,
        ))
        .await
        .unwrap();

        manager
            .transition_domain("d1", PoolType::ReadyWaiting, "first")
            .await
            .unwrap();

        let err = manager
            .transition_domain("d1", PoolType::InitialWarming, "second")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn pool_metrics_flag_high_unhealthy_proportion() {
        let (repo, manager) = manager();
        let now = Utc::now();
        for i in 0..5 {
            let mut d = Domain::new(
                format!("d{i}"),
                "example.com",
                "tenant",
                "ext",
                MailboxClass::StandardMs,
                now,
            );
            d.health_score = if i == 0 { 90 } else { 40 };
            repo.upsert_domain(d).await.unwrap();
        }
        let metrics = manager.get_pool_metrics(PoolType::InitialWarming).await.unwrap();
        assert_eq!(metrics.total_domains, 5);
        assert_eq!(metrics.healthy_domains, 1);
        assert!(metrics
            .risk_factors
            .contains(&"High proportion of unhealthy domains".to_string()));
    }
}
