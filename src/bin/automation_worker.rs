//! Runnable demonstration harness, replacing the teacher's `bin/worker.rs`
//! polling loop with one task per job queue plus a scheduler tick, driven
//! by `tokio::time::interval` instead of a counted `loop`.

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;

use domain_pool_automation::config::Config;
use domain_pool_automation::error::EngineResult;
use domain_pool_automation::models::job::Job;
use domain_pool_automation::AutomationSystem;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let system = AutomationSystem::new(Config::from_env());
    tracing::info!("domain pool automation worker starting");

    let repository = system.repository.clone();
    let job_queue = system.job_queue.clone();
    let engine = system.engine.clone();
    let scheduler = system.scheduler.clone();

    let drain_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            job_queue
                .drain_ready(&repository, {
                    let engine = engine.clone();
                    move |job: Job| {
                        let engine = engine.clone();
                        async move { dispatch(&engine, job).await }
                    }
                })
                .await;
        }
    });

    let scheduler_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = scheduler.tick().await {
                tracing::error!(error = %e, "scheduler tick failed");
            }
        }
    });

    let _ = tokio::join!(drain_handle, scheduler_handle);
    Ok(())
}

async fn dispatch(
    engine: &domain_pool_automation::automation_engine::AutomationEngine,
    job: Job,
) -> EngineResult<()> {
    use domain_pool_automation::models::job::JobType;

    match job.job_type {
        JobType::Health => engine.monitor_domain_health(&job.target_id).await,
        JobType::Test => {
            engine.execute_test(&job.target_id).await?;
            Ok(())
        }
        JobType::Warmup => engine.schedule_next_test(&job.target_id).await,
        JobType::Rotation => engine.execute_rotation(&job.target_id).await,
    }
}
