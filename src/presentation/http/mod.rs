// HTTP Presentation

pub mod dto;
pub mod handlers;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::application::jobs::JobService;
use handlers::job_handlers;

/// Builds the jobs API router
///
/// The health route is registered before the parameterized job-id route
/// so `/health` never resolves as a job id.
pub fn jobs_router(service: Arc<JobService>) -> Router {
    Router::new()
        .route("/api/jobs/health", get(job_handlers::jobs_health))
        .route("/api/jobs/submit", post(job_handlers::submit_job))
        .route("/api/jobs", get(job_handlers::list_jobs))
        .route("/api/jobs/:job_id", get(job_handlers::get_job))
        .route("/api/jobs/:job_id", delete(job_handlers::cancel_job))
        .route("/api/jobs/:job_id/progress", get(job_handlers::job_progress))
        .with_state(service)
}
