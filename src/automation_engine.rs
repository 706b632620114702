//! Top-level orchestrator (spec §4.9): schedules tests, ingests results,
//! triggers rotations, drives transitions.

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::event_bus::{Event, EventBus, EventType};
use crate::models::domain::{RotationEvent, TestHistoryEntry};
use crate::models::placement_test::{PlacementTest, TestStatus};
use crate::models::pool::PoolType;
use crate::notification_service::NotificationService;
use crate::pool_manager::{self, PoolManager};
use crate::provider_gateway::{CampaignPlatform, PlacementProvider};
use crate::repository::Repository;
use crate::transition_rules;

pub struct AutomationEngine {
    repository: Arc<dyn Repository>,
    pool_manager: Arc<PoolManager>,
    event_bus: Arc<EventBus>,
    notifications: Arc<NotificationService>,
    placement_provider: Arc<dyn PlacementProvider>,
    campaign_platform: Arc<dyn CampaignPlatform>,
    clock: SharedClock,
    config: Config,
}

impl AutomationEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        pool_manager: Arc<PoolManager>,
        event_bus: Arc<EventBus>,
        notifications: Arc<NotificationService>,
        placement_provider: Arc<dyn PlacementProvider>,
        campaign_platform: Arc<dyn CampaignPlatform>,
        clock: SharedClock,
        config: Config,
    ) -> Self {
        Self {
            repository,
            pool_manager,
            event_bus,
            notifications,
            placement_provider,
            campaign_platform,
            clock,
            config,
        }
    }

    fn test_frequency_days(&self, pool_type: PoolType) -> f64 {
        match pool_type {
            PoolType::Active => 3.5,
            _ => 21.0,
        }
    }

    /// For every domain in `pool_type`: compute the next test time, refresh
    /// `health_metrics` from the last 5 scores, persist, and publish
    /// `TestScheduled`. Enqueuing the actual `test` job is the caller's
    /// (scheduler's) job, since only it holds the `JobQueue` handle.
    pub async fn schedule_pool_tests(&self, pool_type: PoolType) -> EngineResult<Vec<String>> {
        let domains = self.repository.domains_in_pool(pool_type).await?;
        let mut scheduled_ids = Vec::with_capacity(domains.len());
        for mut domain in domains {
            self.schedule_one(&mut domain).await?;
            scheduled_ids.push(domain.id.clone());
        }
        Ok(scheduled_ids)
    }

    pub async fn schedule_next_test(&self, domain_id: &str) -> EngineResult<()> {
        let mut domain = self.repository.find_domain(domain_id).await?;
        self.schedule_one(&mut domain).await
    }

    async fn schedule_one(&self, domain: &mut crate::models::domain::Domain) -> EngineResult<()> {
        let now = self.clock.now();
        let freq_days = self.test_frequency_days(domain.pool_type);
        let next_test = now + chrono::Duration::milliseconds((freq_days * 86_400_000.0) as i64);
        domain.test_schedule.next_test = Some(next_test);

        let recent_scores = domain.last_scores(5);
        if !recent_scores.is_empty() {
            domain.health_metrics.average_score =
                recent_scores.iter().map(|&s| s as f64).sum::<f64>() / recent_scores.len() as f64;
            domain.health_metrics.samples = recent_scores.len();
            domain.health_metrics.last_updated = now;
        }

        self.repository.upsert_domain(domain.clone()).await?;

        self.event_bus.publish(
            Event::new(EventType::TestScheduled, domain.id.clone(), now)
                .with_field("next_test", next_test.to_rfc3339()),
        );
        Ok(())
    }

    /// Calls the provider to create a test and records its id on the domain.
    pub async fn execute_test(&self, domain_id: &str) -> EngineResult<String> {
        let mut domain = self.repository.find_domain(domain_id).await?;
        if domain.active_test_id.is_some() {
            // Invariant 4: at most one active placement test per domain.
            return Err(EngineError::conflict(format!(
                "domain {domain_id} already has an active test"
            )));
        }

        let descriptor = self.placement_provider.create_test(&domain.name).await?;

        let now = self.clock.now();
        let mut test = PlacementTest::new(descriptor.uuid.clone(), domain_id, now);
        test.test_emails = descriptor.test_emails;
        test.status = TestStatus::Created;
        self.repository.upsert_test(test).await?;

        domain.active_test_id = Some(descriptor.uuid.clone());
        self.repository.upsert_domain(domain).await?;

        Ok(descriptor.uuid)
    }

    /// Fetches the test via the provider; on `completed` status persists a
    /// new test-history entry, updates the health score and
    /// `consecutiveLowScores`, runs `TransitionRules`, delegates any
    /// transition to `PoolManager`, always reschedules the next test, and
    /// publishes `ScoreUpdated` (spec §4.9).
    pub async fn handle_test_results(&self, test_id: &str) -> EngineResult<()> {
        let result = self.placement_provider.get_test(test_id).await?;
        if result.status != TestStatus::Completed {
            // Not done yet; nothing to ingest.
            return Ok(());
        }

        let mut test = self.repository.find_test(test_id).await?;
        let domain_id = test.domain_id.clone();
        let mut domain = self.repository.find_domain(&domain_id).await?;

        let score = result.overall_score.ok_or_else(|| {
            EngineError::fatal(format!("completed test {test_id} has no overall_score"))
        })?;
        let inbox_count = result
            .test_emails
            .iter()
            .filter(|e| matches!(e.folder, Some(crate::models::placement_test::DeliveredFolder::Inbox)))
            .count();
        let total = result.test_emails.len().max(1);
        let inbox_percent = ((inbox_count as f64 / total as f64) * 100.0).round() as u8;
        let spam_percent = 100 - inbox_percent;

        let completed_at = result.completed_at.unwrap_or_else(|| self.clock.now());

        test.status = TestStatus::Completed;
        test.test_emails = result.test_emails;
        test.overall_score = Some(score);
        test.inbox_percent = Some(inbox_percent);
        test.spam_percent = Some(spam_percent);
        test.completed_at = Some(completed_at);
        self.repository.upsert_test(test).await?;

        let inserted = domain.push_test_history(TestHistoryEntry {
            test_id: test_id.to_string(),
            completed_at,
            score,
            inbox_percent,
            spam_percent,
        });

        if inserted {
            domain.recompute_health_score();
            domain.update_consecutive_low_scores(score);
        }
        domain.active_test_id = None;

        let now = self.clock.now();
        let decision = transition_rules::evaluate(&domain, now, &self.config);

        self.repository.upsert_domain(domain.clone()).await?;

        self.event_bus.publish(
            Event::new(EventType::ScoreUpdated, domain_id.clone(), now)
                .with_field("score", score as i64)
                .with_field("health_score", domain.health_score as i64),
        );

        if decision.should_transition {
            if let Some(target) = decision.target_pool {
                self.pool_manager
                    .transition_domain(&domain_id, target, &decision.reason)
                    .await?;
            }
        }

        if score < self.config.health_warning {
            self.notifications
                .notify_low_domain_score(&domain_id, score)
                .await?;
        }

        self.schedule_next_test(&domain_id).await?;
        Ok(())
    }

    /// Refreshes `health_metrics` from the last 5 tests; publishes
    /// `RotationTriggered` if the domain looks unhealthy enough to warrant
    /// one (spec §4.9). Does not itself perform the rotation — that's
    /// `execute_rotation`'s job, triggered by the caller reacting to the
    /// event or by the rotation sweep.
    pub async fn monitor_domain_health(&self, domain_id: &str) -> EngineResult<()> {
        let mut domain = self.repository.find_domain(domain_id).await?;
        let recent = domain.last_scores(5);
        if !recent.is_empty() {
            domain.health_metrics.average_score =
                recent.iter().map(|&s| s as f64).sum::<f64>() / recent.len() as f64;
            domain.health_metrics.samples = recent.len();
            domain.health_metrics.last_updated = self.clock.now();
        }
        self.repository.upsert_domain(domain.clone()).await?;

        if domain.consecutive_low_scores >= self.config.max_consec_low
            || domain.health_metrics.average_score < 65.0
        {
            self.event_bus.publish(
                Event::new(EventType::RotationTriggered, domain_id, self.clock.now())
                    .with_field("reason", "Health check triggered rotation"),
            );
        }
        Ok(())
    }

    /// Aggregates the average across member domains (or uses
    /// `override_score` if given); publishes `HealthCheckNeeded` with
    /// `urgent=true` if below `pool_health_critical` (spec §4.9).
    pub async fn check_pool_health(
        &self,
        pool_type: PoolType,
        override_score: Option<f64>,
    ) -> EngineResult<()> {
        let average = match override_score {
            Some(score) => score,
            None => {
                let domains = self.repository.domains_in_pool(pool_type).await?;
                if domains.is_empty() {
                    0.0
                } else {
                    domains.iter().map(|d| d.health_score as f64).sum::<f64>() / domains.len() as f64
                }
            }
        };

        if average < self.config.pool_health_critical as f64 {
            self.event_bus.publish(
                Event::new(EventType::HealthCheckNeeded, pool_type.as_str(), self.clock.now())
                    .with_field("urgent", true)
                    .with_field(
                        "message",
                        format!("Pool {pool_type} health at {average:.0}, below critical threshold"),
                    ),
            );
        }
        Ok(())
    }

    /// Chooses a replacement via `findReplacementDomain`, swaps every
    /// ACTIVE campaign on `domain_id` over to it, then transitions
    /// source -> Recovery and replacement -> Active. Both pool changes
    /// either both succeed or neither does (spec §4.9).
    pub async fn execute_rotation(&self, domain_id: &str) -> EngineResult<()> {
        let source = self.repository.find_domain(domain_id).await?;

        let replacement =
            pool_manager::find_replacement_domain(&self.repository, 85).await?;
        let Some(replacement) = replacement else {
            self.notifications
                .notify_failed_rotation(domain_id, "no replacement available")
                .await?;
            return Err(EngineError::fatal(format!(
                "no replacement domain available for {domain_id}"
            )));
        };

        let campaign_ids = source.active_campaign_ids();
        let mut errors = Vec::new();
        for campaign_id in &campaign_ids {
            if let Err(e) = self
                .campaign_platform
                .update_campaign_domain(
                    campaign_id,
                    &source.external_provider_id,
                    &replacement.external_provider_id,
                )
                .await
            {
                errors.push(format!("{campaign_id}: {e}"));
            }
        }

        // Both pool changes must both succeed or neither: drive the source
        // transition first, and if the replacement's leg then fails, roll
        // the source back to where it started rather than leave it stranded
        // in Recovery with no matching replacement.
        let source_result = self
            .pool_manager
            .transition_domain_with_campaigns(
                domain_id,
                PoolType::Recovery,
                "Rotated out due to health",
                campaign_ids.clone(),
                errors.clone(),
            )
            .await;

        let source_domain = match source_result {
            Ok(domain) => domain,
            Err(e) => {
                self.notifications
                    .notify_failed_rotation(domain_id, &e.message)
                    .await?;
                return Err(e);
            }
        };

        let replacement_result = self
            .pool_manager
            .transition_domain_with_campaigns(
                &replacement.id,
                PoolType::Active,
                "Rotated in as replacement",
                campaign_ids,
                errors,
            )
            .await;

        if let Err(e) = replacement_result {
            // Compensating action, not a new user-triggered transition: go
            // straight to the repository so it isn't itself denied by the
            // same rate-limit exhaustion that may have caused `e`.
            let rollback_event = RotationEvent {
                at: self.clock.now(),
                from_pool: source_domain.pool_type,
                to_pool: source.pool_type,
                action: "rotation_rolled_back".to_string(),
                reason: format!("replacement transition failed: {e}"),
                campaign_ids: Vec::new(),
                errors: Vec::new(),
            };
            if let Err(rollback_err) = self
                .repository
                .transition_domain_pool(domain_id, source.pool_type, self.clock.now(), rollback_event)
                .await
            {
                tracing::error!(domain_id, error = %rollback_err, "failed to roll back source domain after partial rotation");
            }
            self.notifications
                .notify_failed_rotation(domain_id, &e.message)
                .await?;
            return Err(e);
        }

        Ok(())
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}
