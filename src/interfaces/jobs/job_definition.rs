// Job Definition Interface
//
// A job definition captures everything the engine needs to run one kind
// of parallel job: discovery, per-item processing, optional vectorised
// batch processing, optional finalization, and tuning knobs.
//
// Work items are opaque JSON values; each definition serializes its own
// item shape (file path string, image id, image record).

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use std::time::Duration;

use crate::shared::error::JobError;

/// Opaque unit of work consumed by a job's process function
pub type WorkItem = Value;

/// Execution context handed to every definition hook
///
/// Carries the database pool (definitions read and write catalog tables
/// through it), the identifiers of the run, and the submission parameters.
#[derive(Clone)]
pub struct JobContext {
    /// Shared database pool
    pub pool: Pool<Sqlite>,
    /// The job run this context belongs to
    pub job_id: String,
    /// Catalog being processed (None for non-catalog jobs)
    pub catalog_id: Option<String>,
    /// Submission parameters, immutable for the lifetime of the run
    pub params: Value,
}

impl JobContext {
    /// Reads a parameter by key, falling back to `default` when absent
    pub fn param_str(&self, key: &str, default: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// Reads a numeric parameter by key
    pub fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.params.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    /// Reads a float parameter by key
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    /// The catalog id, or an error for definitions that require one
    pub fn require_catalog(&self) -> Result<&str, JobError> {
        self.catalog_id
            .as_deref()
            .ok_or_else(|| JobError::Process("job requires a catalog_id".into()))
    }
}

/// Outcome of a vectorised batch-processing hook
///
/// Per-item outputs land in `results`; per-item failures are recorded in
/// `errors` as `{item, error}` objects and counted, never propagated.
#[derive(Debug, Clone, Default)]
pub struct BatchProcessOutcome {
    pub processed_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub results: Vec<Value>,
    pub errors: Vec<Value>,
}

/// A registered job definition
///
/// The engine drives the life cycle discover -> process -> finalize; the
/// definition supplies the domain behaviour. Definitions must be stateless
/// (or internally synchronized): the same instance is shared across
/// concurrent batch workers.
#[async_trait]
pub trait JobDefinition: Send + Sync {
    /// Unique job-type name used for registration and submission
    fn name(&self) -> &str;

    /// Number of work items per batch
    fn batch_size(&self) -> usize {
        1000
    }

    /// Upper bound on workers this job wants (the shared pool may be
    /// smaller)
    fn max_workers(&self) -> usize {
        4
    }

    /// Whether failed items are retried inside the batch driver
    fn retry_on_failure(&self) -> bool {
        true
    }

    /// Retry attempts per item when `retry_on_failure` is set
    fn max_retries(&self) -> u32 {
        3
    }

    /// Optional per-item processing deadline
    fn item_timeout(&self) -> Option<Duration> {
        None
    }

    /// Optional per-batch deadline; on expiry the batch is failed with
    /// "timed out" and its worker stops
    fn batch_timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether `process_batch` replaces the engine's per-item loop.
    /// Used by definitions that run vectorised inference over a whole
    /// batch at once.
    fn supports_batch_processing(&self) -> bool {
        false
    }

    /// Wire status published once the job's batches are dispatched.
    /// Tagging overrides this with the historical `STARTED` alias, which
    /// clients accept as `PROGRESS`.
    fn dispatch_status(&self) -> &'static str {
        "PROGRESS"
    }

    /// Enumerates the work items for a catalog
    async fn discover(&self, ctx: &JobContext) -> Result<Vec<WorkItem>, JobError>;

    /// Processes a single work item, returning its output record
    async fn process(&self, ctx: &JobContext, item: &WorkItem) -> Result<Value, JobError>;

    /// Processes a whole batch at once; only called when
    /// `supports_batch_processing` returns true
    async fn process_batch(
        &self,
        ctx: &JobContext,
        items: &[WorkItem],
    ) -> Result<BatchProcessOutcome, JobError> {
        let _ = (ctx, items);
        Err(JobError::Process(format!(
            "job '{}' does not support batch processing",
            self.name()
        )))
    }

    /// Aggregates per-batch outputs into the final result, called exactly
    /// once after every batch future has settled. `batch_results` holds the
    /// per-item outputs of all completed batches, in batch order.
    async fn finalize(
        &self,
        ctx: &JobContext,
        batch_results: &[Value],
    ) -> Result<Option<Value>, JobError> {
        let _ = (ctx, batch_results);
        Ok(None)
    }
}
