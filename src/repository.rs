//! Persistence abstraction for domains, pools, tests, the job log and
//! notifications (spec §4.2). The schema itself is out of scope (spec §1);
//! this module is the trait boundary plus an `InMemoryRepository` that
//! satisfies every guarantee the trait promises, grounded on the teacher's
//! use of a single shared, cloneable handle (`Arc<PgPool>`) passed into
//! every service constructor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::models::domain::{Domain, RotationEvent};
use crate::models::job::JobLogEntry;
use crate::models::notification::Notification;
use crate::models::placement_test::PlacementTest;
use crate::models::pool::{Pool, PoolType};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_domain(&self, id: &str) -> EngineResult<Domain>;
    /// Conditional update by id (spec §4.2): rejected with `Conflict` if a
    /// row already exists for `domain.id` whose `version` doesn't match
    /// `domain.version`. Succeeds unconditionally for a first insert.
    async fn upsert_domain(&self, domain: Domain) -> EngineResult<()>;
    /// Domains whose `test_schedule.next_test <= at`.
    async fn domains_due_for_test(&self, at: DateTime<Utc>) -> EngineResult<Vec<Domain>>;
    async fn domains_in_pool(&self, pool_type: PoolType) -> EngineResult<Vec<Domain>>;

    async fn find_pool(&self, pool_type: PoolType) -> EngineResult<Pool>;
    async fn upsert_pool(&self, pool: Pool) -> EngineResult<()>;

    /// Atomically moves `domain_id` from its current pool's membership to
    /// `target`'s, updates `pool_type`/`pool_entry_date` on the domain, and
    /// appends `event` to its rotation log (spec §3 invariant 5 and 7).
    async fn transition_domain_pool(
        &self,
        domain_id: &str,
        target: PoolType,
        now: DateTime<Utc>,
        event: RotationEvent,
    ) -> EngineResult<Domain>;

    async fn find_test(&self, test_id: &str) -> EngineResult<PlacementTest>;
    async fn upsert_test(&self, test: PlacementTest) -> EngineResult<()>;
    async fn tests_for_domain(&self, domain_id: &str) -> EngineResult<Vec<PlacementTest>>;

    async fn append_job_log(&self, entry: JobLogEntry) -> EngineResult<()>;

    async fn save_notification(&self, notification: Notification) -> EngineResult<()>;
    async fn unread_notifications(&self) -> EngineResult<Vec<Notification>>;
}

#[derive(Default)]
struct Store {
    domains: HashMap<String, Domain>,
    pools: HashMap<PoolType, Pool>,
    tests: HashMap<String, PlacementTest>,
    job_log: Vec<JobLogEntry>,
    notifications: Vec<Notification>,
}

pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(Store::default()),
        })
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self {
            store: RwLock::new(Store::default()),
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_domain(&self, id: &str) -> EngineResult<Domain> {
        self.store
            .read()
            .domains
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("domain {id} not found")))
    }

    async fn upsert_domain(&self, domain: Domain) -> EngineResult<()> {
        let mut store = self.store.write();
        if let Some(existing) = store.domains.get(&domain.id) {
            if existing.version != domain.version {
                return Err(EngineError::conflict(format!(
                    "domain {} was modified concurrently (expected version {}, found {})",
                    domain.id, domain.version, existing.version
                )));
            }
        }
        let mut domain = domain;
        domain.version += 1;
        store.domains.insert(domain.id.clone(), domain);
        Ok(())
    }

    async fn domains_due_for_test(&self, at: DateTime<Utc>) -> EngineResult<Vec<Domain>> {
        Ok(self
            .store
            .read()
            .domains
            .values()
            .filter(|d| matches!(d.test_schedule.next_test, Some(t) if t <= at))
            .cloned()
            .collect())
    }

    async fn domains_in_pool(&self, pool_type: PoolType) -> EngineResult<Vec<Domain>> {
        Ok(self
            .store
            .read()
            .domains
            .values()
            .filter(|d| d.pool_type == pool_type)
            .cloned()
            .collect())
    }

    async fn find_pool(&self, pool_type: PoolType) -> EngineResult<Pool> {
        self.store
            .read()
            .pools
            .get(&pool_type)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("pool {pool_type} not found")))
    }

    async fn upsert_pool(&self, pool: Pool) -> EngineResult<()> {
        self.store.write().pools.insert(pool.pool_type, pool);
        Ok(())
    }

    async fn transition_domain_pool(
        &self,
        domain_id: &str,
        target: PoolType,
        now: DateTime<Utc>,
        event: RotationEvent,
    ) -> EngineResult<Domain> {
        let mut store = self.store.write();

        let mut domain = store
            .domains
            .get(domain_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("domain {domain_id} not found")))?;

        let source = domain.pool_type;
        if source == target {
            // No-op transition: already there, return success unchanged
            // (spec §8 idempotence law).
            return Ok(domain);
        }

        if let Some(source_pool) = store.pools.get_mut(&source) {
            source_pool.member_ids.retain(|id| id != domain_id);
        }
        if let Some(target_pool) = store.pools.get_mut(&target) {
            if !target_pool.member_ids.iter().any(|id| id == domain_id) {
                target_pool.member_ids.push(domain_id.to_string());
            }
        }

        domain.apply_pool_change(target, now);
        domain.rotation_log.push(event);
        domain.version += 1;
        store.domains.insert(domain_id.to_string(), domain.clone());

        Ok(domain)
    }

    async fn find_test(&self, test_id: &str) -> EngineResult<PlacementTest> {
        self.store
            .read()
            .tests
            .get(test_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("test {test_id} not found")))
    }

    async fn upsert_test(&self, test: PlacementTest) -> EngineResult<()> {
        self.store.write().tests.insert(test.id.clone(), test);
        Ok(())
    }

    async fn tests_for_domain(&self, domain_id: &str) -> EngineResult<Vec<PlacementTest>> {
        let mut tests: Vec<PlacementTest> = self
            .store
            .read()
            .tests
            .values()
            .filter(|t| t.domain_id == domain_id)
            .cloned()
            .collect();
        tests.sort_by_key(|t| t.created_at);
        Ok(tests)
    }

    async fn append_job_log(&self, entry: JobLogEntry) -> EngineResult<()> {
        self.store.write().job_log.push(entry);
        Ok(())
    }

    async fn save_notification(&self, notification: Notification) -> EngineResult<()> {
        self.store.write().notifications.push(notification);
        Ok(())
    }

    async fn unread_notifications(&self) -> EngineResult<Vec<Notification>> {
        Ok(self
            .store
            .read()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .cloned()
            .collect())
    }
}
