pub mod automation_engine;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod job_queue;
pub mod models;
pub mod notification_service;
pub mod pool_manager;
pub mod presets;
pub mod provider_gateway;
pub mod rate_limiter;
pub mod repository;
pub mod scheduler;
pub mod transition_rules;

use std::sync::Arc;

use automation_engine::AutomationEngine;
use clock::{SharedClock, SystemClock};
use config::Config;
use event_bus::EventBus;
use job_queue::JobQueue;
use notification_service::NotificationService;
use pool_manager::PoolManager;
use provider_gateway::{CampaignPlatform, PlacementProvider, StubCampaignPlatform, StubPlacementProvider};
use rate_limiter::RateLimiter;
use repository::{InMemoryRepository, Repository};
use scheduler::Scheduler;

/// Everything a host needs to run the domain pool automation engine,
/// wired up the way `main.rs` assembled the teacher's services from a
/// single shared `Arc<PgPool>`.
pub struct AutomationSystem {
    pub repository: Arc<dyn Repository>,
    pub event_bus: Arc<EventBus>,
    pub job_queue: Arc<JobQueue>,
    pub pool_manager: Arc<PoolManager>,
    pub notifications: Arc<NotificationService>,
    pub engine: Arc<AutomationEngine>,
    pub scheduler: Arc<Scheduler>,
    pub config: Config,
}

impl AutomationSystem {
    /// Wires in-memory defaults: `InMemoryRepository`, stub provider/
    /// platform collaborators, `SystemClock`. Suitable for embedding in a
    /// host that supplies its own persistence and provider integrations
    /// later by swapping the relevant `Arc<dyn Trait>` before first use.
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(
            config,
            InMemoryRepository::new() as Arc<dyn Repository>,
            Arc::new(StubPlacementProvider) as Arc<dyn PlacementProvider>,
            Arc::new(StubCampaignPlatform) as Arc<dyn CampaignPlatform>,
            Arc::new(SystemClock) as SharedClock,
        )
    }

    pub fn with_collaborators(
        config: Config,
        repository: Arc<dyn Repository>,
        placement_provider: Arc<dyn PlacementProvider>,
        campaign_platform: Arc<dyn CampaignPlatform>,
        clock: SharedClock,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let rate_limiter = Arc::new(RateLimiter::new(
            clock.clone(),
            config.rate_per_domain,
            config.rate_global,
        ));
        let notifications = Arc::new(NotificationService::new(repository.clone(), clock.clone()));
        let job_queue = Arc::new(JobQueue::new(
            rate_limiter.clone(),
            clock.clone(),
            config.clone(),
            notifications.clone(),
        ));
        let pool_manager = Arc::new(PoolManager::new(
            repository.clone(),
            event_bus.clone(),
            rate_limiter,
            clock.clone(),
            config.clone(),
        ));
        let engine = Arc::new(AutomationEngine::new(
            repository.clone(),
            pool_manager.clone(),
            event_bus.clone(),
            notifications.clone(),
            placement_provider,
            campaign_platform,
            clock.clone(),
            config.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(repository.clone(), job_queue.clone(), clock));

        Self {
            repository,
            event_bus,
            job_queue,
            pool_manager,
            notifications,
            engine,
            scheduler,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_wires_all_four_pools_reachable() {
        let system = AutomationSystem::new(Config::default());
        for pool_type in models::pool::PoolType::all() {
            system
                .pool_manager
                .initialize_pool(pool_type, models::pool::MailboxClass::StandardMs)
                .await
                .unwrap();
        }
        let metrics = system
            .pool_manager
            .get_pool_metrics(models::pool::PoolType::Active)
            .await
            .unwrap();
        assert_eq!(metrics.total_domains, 0);
    }
}
