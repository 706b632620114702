//! Recurring sweep driver (spec §4.11). Generalizes the teacher's
//! `bin/worker.rs` iteration-counter loop (`if iteration % N == 0`) into
//! four independently-timed sweeps, each comparing `Clock::now()` against
//! its own last-run mark rather than counting polling iterations. Every
//! sweep enqueues per-domain jobs onto the `JobQueue`; it never does the
//! work inline.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::error::EngineResult;
use crate::job_queue::JobQueue;
use crate::models::job::{JobType, Priority};
use crate::models::pool::PoolType;
use crate::repository::Repository;

struct SweepMarks {
    health: Option<DateTime<Utc>>,
    test_scheduling: Option<DateTime<Utc>>,
    warmup: Option<DateTime<Utc>>,
    rotation: Option<DateTime<Utc>>,
}

impl Default for SweepMarks {
    fn default() -> Self {
        Self {
            health: None,
            test_scheduling: None,
            warmup: None,
            rotation: None,
        }
    }
}

/// Drives the four recurring sweeps named in spec §4.11. A host calls
/// `tick` on whatever cadence it likes (a `tokio::time::interval`, for
/// instance); `Scheduler` itself decides whether each sweep is actually due.
pub struct Scheduler {
    repository: Arc<dyn Repository>,
    job_queue: Arc<JobQueue>,
    clock: SharedClock,
    marks: Mutex<SweepMarks>,
}

impl Scheduler {
    pub fn new(repository: Arc<dyn Repository>, job_queue: Arc<JobQueue>, clock: SharedClock) -> Self {
        Self {
            repository,
            job_queue,
            clock,
            marks: Mutex::new(SweepMarks::default()),
        }
    }

    /// Checks every sweep's due-ness against `now` and runs whichever are
    /// due. Safe to call as often as a host likes; sweeps no-op between
    /// their own cadences.
    pub async fn tick(&self) -> EngineResult<()> {
        let now = self.clock.now();

        if self.due(|m| m.health, ChronoDuration::hours(6), now) {
            self.run_health_sweep().await?;
            self.marks.lock().health = Some(now);
        }
        if self.due_daily_at(|m| m.test_scheduling, 0, now) {
            self.run_test_scheduling_sweep().await?;
            self.marks.lock().test_scheduling = Some(now);
        }
        if self.due_daily_at(|m| m.warmup, 6, now) {
            self.run_warmup_sweep().await?;
            self.marks.lock().warmup = Some(now);
        }
        if self.due(|m| m.rotation, ChronoDuration::hours(12), now) {
            self.run_rotation_sweep().await?;
            self.marks.lock().rotation = Some(now);
        }
        Ok(())
    }

    fn due(&self, mark: impl Fn(&SweepMarks) -> Option<DateTime<Utc>>, period: ChronoDuration, now: DateTime<Utc>) -> bool {
        match mark(&self.marks.lock()) {
            None => true,
            Some(last) => now - last >= period,
        }
    }

    /// Due once per UTC day, the first time `now`'s hour reaches
    /// `target_hour` after the last run.
    fn due_daily_at(
        &self,
        mark: impl Fn(&SweepMarks) -> Option<DateTime<Utc>>,
        target_hour: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if now.hour() < target_hour {
            return false;
        }
        match mark(&self.marks.lock()) {
            None => true,
            Some(last) => last.date_naive() < now.date_naive(),
        }
    }

    async fn run_health_sweep(&self) -> EngineResult<()> {
        let now = self.clock.now();
        let mut enqueued = 0;
        for pool_type in PoolType::all() {
            let domains = self.repository.domains_in_pool(pool_type).await?;
            for domain in domains {
                self.job_queue.enqueue(
                    JobType::Health,
                    domain.id,
                    Priority::Medium,
                    now,
                    serde_json::Value::Null,
                );
                enqueued += 1;
            }
        }
        tracing::info!(enqueued, "health sweep enqueued domain health jobs");
        Ok(())
    }

    async fn run_test_scheduling_sweep(&self) -> EngineResult<()> {
        let now = self.clock.now();
        let due = self.repository.domains_due_for_test(now).await?;
        for domain in &due {
            self.job_queue.enqueue(
                JobType::Test,
                domain.id.clone(),
                Priority::Medium,
                now,
                serde_json::Value::Null,
            );
        }
        tracing::info!(enqueued = due.len(), "test-scheduling sweep enqueued test jobs");
        Ok(())
    }

    async fn run_warmup_sweep(&self) -> EngineResult<()> {
        let now = self.clock.now();
        let mut enqueued = 0;
        for pool_type in [PoolType::InitialWarming, PoolType::ReadyWaiting, PoolType::Recovery] {
            let domains = self.repository.domains_in_pool(pool_type).await?;
            for domain in domains {
                self.job_queue.enqueue(
                    JobType::Warmup,
                    domain.id,
                    Priority::Low,
                    now,
                    serde_json::Value::Null,
                );
                enqueued += 1;
            }
        }
        tracing::info!(enqueued, "warmup sweep enqueued warmup jobs");
        Ok(())
    }

    async fn run_rotation_sweep(&self) -> EngineResult<()> {
        let now = self.clock.now();
        let active = self.repository.domains_in_pool(PoolType::Active).await?;
        let mut enqueued = 0;
        for domain in active {
            if domain.consecutive_low_scores >= 2 {
                self.job_queue.enqueue(
                    JobType::Rotation,
                    domain.id,
                    Priority::High,
                    now,
                    serde_json::Value::Null,
                );
                enqueued += 1;
            }
        }
        tracing::info!(enqueued, "rotation sweep enqueued rotation jobs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::config::Config;
    use crate::models::domain::Domain;
    use crate::models::pool::MailboxClass;
    use crate::notification_service::NotificationService;
    use crate::rate_limiter::RateLimiter;
    use crate::repository::InMemoryRepository;

    fn scheduler_with(now: DateTime<Utc>) -> (Scheduler, Arc<InMemoryRepository>, VirtualClock) {
        let clock = VirtualClock::new(now);
        let shared: SharedClock = Arc::new(clock.clone());
        let repo = InMemoryRepository::new();
        let limiter = Arc::new(RateLimiter::new(shared.clone(), 1000, 1000));
        let notifications = Arc::new(NotificationService::new(
            repo.clone() as Arc<dyn Repository>,
            shared.clone(),
        ));
        let queue = Arc::new(JobQueue::new(limiter, shared.clone(), Config::default(), notifications));
        let scheduler = Scheduler::new(repo.clone() as Arc<dyn Repository>, queue, shared);
        (scheduler, repo, clock)
    }

    #[tokio::test]
    async fn health_sweep_runs_once_then_waits_six_hours() {
        let now = Utc::now();
        let (scheduler, repo, clock) = scheduler_with(now);
        repo.upsert_domain(Domain::new("d1", "a.com", "t", "ext", MailboxClass::StandardMs, now))
            .await
            .unwrap();

        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.job_queue.counts(JobType::Health).waiting, 1);

        clock.advance(chrono::Duration::hours(3));
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.job_queue.counts(JobType::Health).waiting, 1);

        clock.advance(chrono::Duration::hours(4));
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.job_queue.counts(JobType::Health).waiting, 2);
    }

    #[tokio::test]
    async fn test_scheduling_sweep_only_enqueues_due_domains() {
        let now = Utc::now();
        let (scheduler, repo, _clock) = scheduler_with(now);

        let mut due = Domain::new("due", "a.com", "t", "ext", MailboxClass::StandardMs, now);
        due.test_schedule.next_test = Some(now - chrono::Duration::minutes(1));
        repo.upsert_domain(due).await.unwrap();

        let mut not_due = Domain::new("not-due", "b.com", "t", "ext", MailboxClass::StandardMs, now);
        not_due.test_schedule.next_test = Some(now + chrono::Duration::days(1));
        repo.upsert_domain(not_due).await.unwrap();

        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.job_queue.counts(JobType::Test).waiting, 1);
    }

    #[tokio::test]
    async fn rotation_sweep_skips_domains_below_threshold() {
        let now = Utc::now();
        let (scheduler, repo, _clock) = scheduler_with(now);

        let mut risky = Domain::new("risky", "a.com", "t", "ext", MailboxClass::StandardMs, now);
        risky.pool_type = PoolType::Active;
        risky.consecutive_low_scores = 2;
        repo.upsert_domain(risky).await.unwrap();

        let mut healthy = Domain::new("healthy", "b.com", "t", "ext", MailboxClass::StandardMs, now);
        healthy.pool_type = PoolType::Active;
        healthy.consecutive_low_scores = 0;
        repo.upsert_domain(healthy).await.unwrap();

        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.job_queue.counts(JobType::Rotation).waiting, 1);
    }
}
