//! Job Handlers
//!
//! HTTP handlers for job submission, inspection, cancellation, and the
//! progress poll endpoint.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::application::jobs::JobService;
use crate::presentation::http::dto::{CancelResponse, JobResponse, JobSubmitRequest};
use crate::shared::error::JobError;

/// Maps job errors onto the HTTP surface
fn error_response(err: JobError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        JobError::UnknownJobType(_) | JobError::CannotCancelTerminal(_) => StatusCode::BAD_REQUEST,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "detail": err.to_string() })))
}

/// Jobs system health check
pub async fn jobs_health(State(service): State<Arc<JobService>>) -> impl IntoResponse {
    (StatusCode::OK, Json(service.health()))
}

/// Submit a new job
pub async fn submit_job(
    State(service): State<Arc<JobService>>,
    Json(request): Json<JobSubmitRequest>,
) -> impl IntoResponse {
    match service
        .submit(&request.job_type, request.catalog_id, request.parameters)
        .await
    {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Get job status
pub async fn get_job(
    State(service): State<Arc<JobService>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match service.get(&job_id).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Job listing query parameters
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub catalog_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// List jobs, newest first
pub async fn list_jobs(
    State(service): State<Arc<JobService>>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    match service.list(query.catalog_id, query.limit).await {
        Ok(jobs) => {
            let responses: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
            (StatusCode::OK, Json(responses)).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// Cancel a job (cooperative; in-flight workers stop at the next check)
pub async fn cancel_job(
    State(service): State<Arc<JobService>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match service.cancel(&job_id).await {
        Ok(cancelled) => (StatusCode::OK, Json(CancelResponse { cancelled })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Latest published progress payload for a job
///
/// Poll target for clients between notifications; 404 until the first
/// publish.
pub async fn job_progress(
    State(service): State<Arc<JobService>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match service.last_progress(&job_id).await {
        Some(payload) => (StatusCode::OK, Json(payload)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "No progress published" })),
        )
            .into_response(),
    }
}
