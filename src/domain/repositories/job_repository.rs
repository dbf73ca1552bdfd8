//! Job repository interface
//!
//! Persistence boundary over Job and JobBatch records. Implementations
//! must make every multi-row mutation a single transaction and keep the
//! conditional batch claim atomic.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::entities::{BatchCounters, ClaimedBatch, Job, JobBatch};
use crate::domain::value_objects::{AggregateProgress, JobStatus, ProgressSnapshot};
use crate::shared::error::RepositoryError;

/// Partial update applied to a job row
///
/// `completed_at` is stamped by the implementation iff `status` becomes
/// terminal.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<ProgressSnapshot>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Filter for job listings
#[derive(Debug, Clone)]
pub struct JobFilter {
    /// Restrict to one catalog
    pub catalog_id: Option<String>,
    /// Maximum rows returned, newest first
    pub limit: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            catalog_id: None,
            limit: 50,
        }
    }
}

/// Repository interface for jobs and their batches
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persists a new job row
    async fn create_job(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Applies a partial update; fails with `NotFound` if the job does not exist
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), RepositoryError>;

    /// Fetches a job by id
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, RepositoryError>;

    /// Lists jobs, newest first
    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, RepositoryError>;

    /// Inserts all batches for a job atomically, returning their ids in
    /// batch-number order
    async fn create_batches(&self, batches: &[JobBatch]) -> Result<Vec<String>, RepositoryError>;

    /// Atomically transitions a batch from `pending` to `running` for one
    /// worker. Returns `None` when the batch was already claimed (or does
    /// not exist).
    async fn claim_batch(
        &self,
        batch_id: &str,
        worker_id: &str,
    ) -> Result<Option<ClaimedBatch>, RepositoryError>;

    /// Transitions `running -> completed`, writing counters and results
    async fn complete_batch(
        &self,
        batch_id: &str,
        counters: BatchCounters,
        results: &Value,
    ) -> Result<(), RepositoryError>;

    /// Transitions `running -> failed` with an error message
    async fn fail_batch(&self, batch_id: &str, error_message: &str)
        -> Result<(), RepositoryError>;

    /// Transitions `running -> cancelled`
    async fn cancel_batch(&self, batch_id: &str) -> Result<(), RepositoryError>;

    /// Fetches a batch by id
    async fn get_batch(&self, batch_id: &str) -> Result<Option<JobBatch>, RepositoryError>;

    /// Computes aggregate progress over all batches of a job with a single
    /// grouped query
    async fn aggregate_progress(
        &self,
        parent_job_id: &str,
    ) -> Result<AggregateProgress, RepositoryError>;

    /// True when the job row is terminal with FAILURE (covers user
    /// cancellation)
    async fn is_cancelled(&self, job_id: &str) -> Result<bool, RepositoryError>;

    /// Deletes terminal jobs (and their batches) older than `max_age_hours`.
    /// Returns the number of jobs removed.
    async fn cleanup_old_jobs(&self, max_age_hours: i64) -> Result<u64, RepositoryError>;
}
