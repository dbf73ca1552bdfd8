//! Job Service
//!
//! Submission surface called by the HTTP layer: submit, get, list,
//! cancel, progress poll, and the health probe. Owns the wiring between
//! the store, the registry, and the controller.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use crate::domain::entities::Job;
use crate::domain::repositories::{JobFilter, JobRepository};
use crate::infrastructure::jobs::JobRegistry;
use crate::interfaces::messaging::ProgressChannel;
use crate::shared::error::JobError;

use super::job_controller::JobController;

/// Application service for job submission and inspection
pub struct JobService {
    repository: Arc<dyn JobRepository>,
    progress: Arc<dyn ProgressChannel>,
    registry: Arc<JobRegistry>,
    controller: Arc<JobController>,
}

impl JobService {
    /// Creates a new job service
    pub fn new(
        repository: Arc<dyn JobRepository>,
        progress: Arc<dyn ProgressChannel>,
        registry: Arc<JobRegistry>,
        controller: Arc<JobController>,
    ) -> Self {
        Self {
            repository,
            progress,
            registry,
            controller,
        }
    }

    /// Submits a new job and starts its controller run in the background
    ///
    /// # Errors
    /// Returns `UnknownJobType` when no definition matches `job_type`.
    pub async fn submit(
        &self,
        job_type: &str,
        catalog_id: Option<String>,
        parameters: Value,
    ) -> Result<Job, JobError> {
        if self.registry.get(job_type).is_none() {
            return Err(JobError::UnknownJobType(job_type.to_string()));
        }

        let job = Job::new(job_type, catalog_id, parameters)
            .map_err(|e| JobError::Fatal(e.to_string()))?;
        self.repository.create_job(&job).await?;
        info!("Submitted job {} (type={})", job.id, job.job_type);

        let controller = self.controller.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.run(job_id.clone()).await {
                error!("Job {} run failed: {}", job_id, e);
            }
        });

        Ok(job)
    }

    /// Fetches a job by id
    pub async fn get(&self, job_id: &str) -> Result<Job, JobError> {
        self.repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Lists jobs, newest first
    pub async fn list(
        &self,
        catalog_id: Option<String>,
        limit: i64,
    ) -> Result<Vec<Job>, JobError> {
        Ok(self
            .repository
            .list_jobs(JobFilter { catalog_id, limit })
            .await?)
    }

    /// Cancels a job
    pub async fn cancel(&self, job_id: &str) -> Result<bool, JobError> {
        self.controller.cancel(job_id).await
    }

    /// Latest progress payload for a job, if any was published
    pub async fn last_progress(&self, job_id: &str) -> Option<Value> {
        self.progress.get_last_progress(job_id).await
    }

    /// Health probe for the jobs subsystem
    pub fn health(&self) -> Value {
        json!({ "status": "healthy", "backend": "threading" })
    }

    /// Registered job type names
    pub fn job_types(&self) -> Vec<String> {
        self.registry.list_names()
    }
}
