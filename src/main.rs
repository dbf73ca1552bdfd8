mod application;
mod domain;
mod infrastructure;
mod interfaces;
mod presentation;
mod shared;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::application::jobs::definitions::register_builtin_jobs;
use crate::application::jobs::{JobController, JobService};
use crate::infrastructure::database::{initialize_schema, ConnectionPool};
use crate::infrastructure::jobs::{global_registry, global_worker_pool};
use crate::infrastructure::messaging::DatabaseProgressChannel;
use crate::domain::repositories::JobRepository;
use crate::infrastructure::persistence::sqlite::SqliteJobRepository;
use crate::interfaces::messaging::ProgressChannel;
use crate::presentation::http::jobs_router;
use crate::shared::config::JobConfig;

/// Retention window for terminal jobs and progress snapshots
const CLEANUP_MAX_AGE_HOURS: i64 = 24;

/// Interval between retention sweeps
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("darkroomd=info,sqlx=warn")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting DarkroomD");

    // Database
    let connection_pool = ConnectionPool::from_env()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let db_pool = connection_pool.inner().clone();
    initialize_schema(&db_pool).await?;

    // Job engine wiring
    let config = JobConfig::from_env();
    let repository = Arc::new(SqliteJobRepository::new(db_pool.clone()));
    let progress: Arc<dyn ProgressChannel> =
        Arc::new(DatabaseProgressChannel::new(db_pool.clone()));
    let registry = global_registry();
    register_builtin_jobs(&registry).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let pool = global_worker_pool(config.max_workers);

    let controller = Arc::new(JobController::new(
        repository.clone(),
        progress.clone(),
        registry.clone(),
        pool.clone(),
        db_pool.clone(),
        config.clone(),
    ));
    let service = Arc::new(JobService::new(
        repository.clone(),
        progress.clone(),
        registry,
        controller,
    ));

    // Periodic retention sweep for terminal jobs and progress rows
    {
        let repository = repository.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = repository.cleanup_old_jobs(CLEANUP_MAX_AGE_HOURS).await {
                    tracing::warn!("Job cleanup failed: {}", e);
                }
                progress.cleanup_old(CLEANUP_MAX_AGE_HOURS).await;
            }
        });
    }

    // HTTP surface
    let app = jobs_router(service).layer(CorsLayer::permissive());
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8765".to_string())
        .parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    // Drain in-flight workers before exit
    pool.shutdown(true, Some(std::time::Duration::from_secs(30)))
        .await;
    connection_pool.close().await;
    Ok(())
}
