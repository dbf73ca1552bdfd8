//! Job Controller
//!
//! Orchestrates one job run end to end: startup transition, discovery,
//! batching, dispatch to the worker pool, aggregation, finalization, and
//! the terminal decision (success, success-with-errors, or auto-requeue).
//!
//! The controller also owns cancellation (cooperative, via per-run tokens
//! plus the persistent job status) and the per-job deadline watcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::entities::{BatchCounters, Job};
use crate::domain::repositories::{JobRepository, JobUpdate};
use crate::domain::value_objects::{JobStatus, ProgressSnapshot};
use crate::infrastructure::jobs::{JobRegistry, WorkerPool};
use crate::interfaces::jobs::{JobContext, JobDefinition};
use crate::interfaces::messaging::ProgressChannel;
use crate::shared::config::{JobConfig, CONSECUTIVE_FAILURE_THRESHOLD, RETRY_DELAY};
use crate::shared::error::JobError;

use super::batch_manager::BatchManager;

/// Error-message patterns treated as transient by the retry wrapper
static TRANSIENT_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)connection|timeout|temporarily unavailable|deadlock|lock")
        .expect("invalid transient pattern")
});

/// Worker identifier sequence, process-wide
static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Whether an error message matches the transient patterns
pub fn is_transient_error(message: &str) -> bool {
    TRANSIENT_PATTERNS.is_match(message)
}

/// Retries an operation on transient errors with `RETRY_DELAY * attempt`
/// back-off. Non-matching errors surface immediately.
pub async fn with_transient_retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, JobError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, JobError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries || !is_transient_error(&e.to_string()) {
                    return Err(e);
                }
                warn!(
                    "Transient error (attempt {}/{}): {}; retrying",
                    attempt, max_retries, e
                );
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
        }
    }
}

/// Terminal state of one batch driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcomeStatus {
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// What one batch driver reported back to the controller
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub batch_number: i64,
    pub status: BatchOutcomeStatus,
    pub processed_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    /// Per-item outputs, consumed by finalize
    pub results: Vec<Value>,
    /// Per-item error records `{item, error}`
    pub errors: Vec<Value>,
    /// Batch-level error message (status Failed/Cancelled)
    pub error: Option<String>,
}

impl BatchOutcome {
    fn empty(batch_id: &str, status: BatchOutcomeStatus) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            batch_number: 0,
            status,
            processed_count: 0,
            success_count: 0,
            error_count: 0,
            results: Vec::new(),
            errors: Vec::new(),
            error: None,
        }
    }

    fn failed(batch_id: &str, batch_number: i64, error: String) -> Self {
        Self {
            batch_number,
            error: Some(error),
            ..Self::empty(batch_id, BatchOutcomeStatus::Failed)
        }
    }
}

/// The closure one worker pool slot runs for one batch
struct BatchDriver {
    definition: Arc<dyn JobDefinition>,
    manager: Arc<BatchManager>,
    ctx: JobContext,
    batch_id: String,
    run_token: CancellationToken,
}

impl BatchDriver {
    async fn run(self, pool_token: CancellationToken) -> BatchOutcome {
        let worker_id = format!("worker-{}", WORKER_SEQ.fetch_add(1, Ordering::SeqCst));

        match self.try_run(&worker_id, &pool_token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[{}] Batch {} driver failed: {}", worker_id, self.batch_id, e);
                if let Err(fail_err) = self.manager.fail_batch(&self.batch_id, &e.to_string()).await
                {
                    warn!(
                        "[{}] Could not record failure of batch {}: {}",
                        worker_id, self.batch_id, fail_err
                    );
                }
                BatchOutcome::failed(&self.batch_id, 0, e.to_string())
            }
        }
    }

    async fn try_run(
        &self,
        worker_id: &str,
        pool_token: &CancellationToken,
    ) -> Result<BatchOutcome, JobError> {
        let Some(claimed) = self.manager.claim_batch(&self.batch_id, worker_id).await? else {
            warn!("[{}] Batch {} already claimed", worker_id, self.batch_id);
            return Ok(BatchOutcome::empty(&self.batch_id, BatchOutcomeStatus::Skipped));
        };

        let batch_number = claimed.batch_number;
        let total_batches = claimed.total_batches;
        info!(
            "[{}] Processing batch {}/{} ({} items)",
            worker_id,
            batch_number + 1,
            total_batches,
            claimed.items_count
        );

        // Cancellation check before processing the first item
        if self.cancel_requested(pool_token).await {
            return self.record_cancelled(worker_id, batch_number).await;
        }

        let outcome = if self.definition.supports_batch_processing() {
            match self
                .with_batch_deadline(self.definition.process_batch(&self.ctx, &claimed.work_items))
                .await
            {
                Ok(out) => BatchOutcome {
                    batch_id: self.batch_id.clone(),
                    batch_number,
                    status: BatchOutcomeStatus::Completed,
                    processed_count: out.processed_count,
                    success_count: out.success_count,
                    error_count: out.error_count,
                    results: out.results,
                    errors: out.errors,
                    error: None,
                },
                Err(e) => {
                    self.manager.fail_batch(&self.batch_id, &e.to_string()).await?;
                    return Ok(BatchOutcome::failed(&self.batch_id, batch_number, e.to_string()));
                }
            }
        } else {
            match self
                .with_batch_deadline(self.process_items(
                    worker_id,
                    batch_number,
                    &claimed.work_items,
                    pool_token,
                ))
                .await?
            {
                Some(outcome) => outcome,
                // Cancelled between items
                None => return self.record_cancelled(worker_id, batch_number).await,
            }
        };

        self.manager
            .complete_batch(
                &self.batch_id,
                BatchCounters {
                    processed_count: outcome.processed_count,
                    success_count: outcome.success_count,
                    error_count: outcome.error_count,
                },
                &json!({ "items": outcome.results, "errors": outcome.errors }),
                &format!("Batch {}/{} complete", batch_number + 1, total_batches),
            )
            .await?;

        info!(
            "[{}] Batch {}/{} complete: {} succeeded, {} errors",
            worker_id,
            batch_number + 1,
            total_batches,
            outcome.success_count,
            outcome.error_count
        );
        Ok(outcome)
    }

    /// Per-item loop; returns `None` when cancellation interrupted it
    async fn process_items(
        &self,
        worker_id: &str,
        batch_number: i64,
        items: &[Value],
        pool_token: &CancellationToken,
    ) -> Result<Option<BatchOutcome>, JobError> {
        let mut outcome = BatchOutcome {
            batch_number,
            status: BatchOutcomeStatus::Completed,
            ..BatchOutcome::empty(&self.batch_id, BatchOutcomeStatus::Completed)
        };

        for (index, item) in items.iter().enumerate() {
            // Token checks are cheap, so run them every item; the database
            // check happens every 25 items.
            if pool_token.is_cancelled() || self.run_token.is_cancelled() {
                return Ok(None);
            }
            if index % 25 == 0 && index > 0 && self.manager.is_cancelled().await? {
                return Ok(None);
            }

            match self.process_one(item).await {
                Ok(result) => {
                    outcome.results.push(result);
                    outcome.success_count += 1;
                }
                Err(e) => {
                    warn!("[{}] Error processing item {}: {}", worker_id, index, e);
                    outcome.errors.push(json!({ "item": item, "error": e.to_string() }));
                    outcome.error_count += 1;
                }
            }
            outcome.processed_count += 1;
        }

        Ok(Some(outcome))
    }

    /// One item with the definition's timeout and retry budget applied
    async fn process_one(&self, item: &Value) -> Result<Value, JobError> {
        let attempts = if self.definition.retry_on_failure() {
            self.definition.max_retries().max(1)
        } else {
            1
        };

        let mut last_error = JobError::Process("no attempts made".into());
        for attempt in 1..=attempts {
            let processed = match self.definition.item_timeout() {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, self.definition.process(&self.ctx, item))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(JobError::Process(format!(
                            "item timed out after {:?}",
                            deadline
                        ))),
                    }
                }
                None => self.definition.process(&self.ctx, item).await,
            };

            match processed {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Applies the definition's per-batch deadline, when set
    async fn with_batch_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, JobError>>,
    ) -> Result<T, JobError> {
        match self.definition.batch_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, fut)
                .await
                .unwrap_or_else(|_| Err(JobError::Process("timed out".into()))),
            None => fut.await,
        }
    }

    async fn cancel_requested(&self, pool_token: &CancellationToken) -> bool {
        pool_token.is_cancelled()
            || self.run_token.is_cancelled()
            || self.manager.is_cancelled().await.unwrap_or(false)
    }

    async fn record_cancelled(
        &self,
        worker_id: &str,
        batch_number: i64,
    ) -> Result<BatchOutcome, JobError> {
        warn!(
            "[{}] Batch {} cancelled before completion",
            worker_id, self.batch_id
        );
        self.manager.cancel_batch(&self.batch_id).await?;
        Ok(BatchOutcome {
            batch_number,
            error: Some("Job cancelled by user".into()),
            ..BatchOutcome::empty(&self.batch_id, BatchOutcomeStatus::Cancelled)
        })
    }
}

/// Controller for the full life cycle of job runs
pub struct JobController {
    repository: Arc<dyn JobRepository>,
    progress: Arc<dyn ProgressChannel>,
    registry: Arc<JobRegistry>,
    pool: Arc<WorkerPool>,
    db_pool: Pool<Sqlite>,
    config: JobConfig,
    /// Cancellation tokens of in-flight runs, by job id
    active_runs: Mutex<HashMap<String, CancellationToken>>,
}

impl JobController {
    /// Creates a new controller
    pub fn new(
        repository: Arc<dyn JobRepository>,
        progress: Arc<dyn ProgressChannel>,
        registry: Arc<JobRegistry>,
        pool: Arc<WorkerPool>,
        db_pool: Pool<Sqlite>,
        config: JobConfig,
    ) -> Self {
        Self {
            repository,
            progress,
            registry,
            pool,
            db_pool,
            config,
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    /// Runs a job to its terminal state, returning the result map
    ///
    /// Bounded by the configured per-job deadline; on expiry the job is
    /// failed with a timeout error and its workers are cancelled.
    pub fn run(
        self: Arc<Self>,
        job_id: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, JobError>> + Send>> {
        Box::pin(async move {
            let job = self
                .repository
                .get_job(&job_id)
                .await?
                .ok_or_else(|| JobError::NotFound(job_id.clone()))?;

            let Some(definition) = self.registry.get(&job.job_type) else {
                let err = JobError::UnknownJobType(job.job_type.clone());
                self.mark_failure(&job_id, &err.to_string()).await;
                return Err(err);
            };

            info!(
                "Starting job {} (id={}) for catalog {:?}",
                job.job_type, job_id, job.catalog_id
            );

            let run_token = CancellationToken::new();
            self.active_runs
                .lock()
                .expect("controller poisoned")
                .insert(job_id.clone(), run_token.clone());

            let result = tokio::select! {
                result = self.execute(&job, definition, run_token.clone()) => result,
                _ = tokio::time::sleep(self.config.job_timeout()) => {
                    run_token.cancel();
                    let err = JobError::Timeout(self.config.job_timeout_seconds);
                    Err(err)
                }
            };

            self.active_runs
                .lock()
                .expect("controller poisoned")
                .remove(&job_id);

            match result {
                Ok(value) => {
                    info!("Job {} completed", job_id);
                    Ok(value)
                }
                Err(e) => {
                    error!("Job {} failed: {}", job_id, e);
                    self.mark_failure(&job_id, &e.to_string()).await;
                    Err(e)
                }
            }
        })
    }

    /// Cancels a job run
    ///
    /// Pending and running jobs transition to FAILURE with the canonical
    /// cancellation error; in-flight workers observe it at their next
    /// check. Terminal jobs cannot be cancelled.
    pub async fn cancel(&self, job_id: &str) -> Result<bool, JobError> {
        let job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if job.is_terminal() {
            return Err(JobError::CannotCancelTerminal(job_id.to_string()));
        }

        self.repository
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Failure),
                    error: Some("Job cancelled by user".into()),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(token) = self
            .active_runs
            .lock()
            .expect("controller poisoned")
            .get(job_id)
        {
            token.cancel();
        }

        self.progress
            .publish_completion(job_id, "FAILURE", None, Some("Job cancelled by user"))
            .await;

        info!("Job {} cancelled by user", job_id);
        Ok(true)
    }

    async fn execute(
        self: &Arc<Self>,
        job: &Job,
        definition: Arc<dyn JobDefinition>,
        run_token: CancellationToken,
    ) -> Result<Value, JobError> {
        let job_id = &job.id;

        // Startup: PENDING -> PROGRESS with an initial snapshot
        let initial = ProgressSnapshot::new(0, 0).with_phase("starting");
        self.update_with_retry(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Progress),
                progress: Some(initial.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.progress
            .publish_progress(job_id, "PROGRESS", &initial)
            .await;

        let ctx = JobContext {
            pool: self.db_pool.clone(),
            job_id: job_id.clone(),
            catalog_id: job.catalog_id.clone(),
            params: job.parameters.clone(),
        };

        // Discovery
        let items = with_transient_retry(self.config.max_retries, || definition.discover(&ctx))
            .await?;
        let total_items = items.len() as u64;
        info!("Discovered {} items for job {}", total_items, job_id);

        if items.is_empty() {
            return self.finish_empty(job_id, &ctx, &definition).await;
        }

        // Batching
        let batch_size = job
            .parameters
            .get("batch_size")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .filter(|v| *v > 0)
            .unwrap_or_else(|| definition.batch_size());

        let manager = Arc::new(BatchManager::new(
            self.repository.clone(),
            self.progress.clone(),
            job_id.clone(),
            job.catalog_id.clone(),
            job.job_type.clone(),
        ));
        let batch_ids = manager.create_batches(items, batch_size).await?;
        let num_batches = batch_ids.len();

        let batching = ProgressSnapshot::new(0, total_items)
            .with_message(format!(
                "Processing {} items in {} batches",
                total_items, num_batches
            ))
            .with_phase("batching")
            .with_extra("batches_total", json!(num_batches));
        self.update_with_retry(
            job_id,
            JobUpdate {
                progress: Some(batching.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.progress
            .publish_progress(job_id, definition.dispatch_status(), &batching)
            .await;

        // Dispatch one driver per batch
        let mut handles = Vec::with_capacity(num_batches);
        for batch_id in &batch_ids {
            let driver = BatchDriver {
                definition: definition.clone(),
                manager: manager.clone(),
                ctx: ctx.clone(),
                batch_id: batch_id.clone(),
                run_token: run_token.clone(),
            };
            let handle = self
                .pool
                .submit(job_id.clone(), move |token| driver.run(token));
            handles.push((batch_id.clone(), handle));
        }

        // Propagate run cancellation to queued drivers
        let worker_tokens: Vec<CancellationToken> =
            handles.iter().map(|(_, h)| h.token().clone()).collect();
        let cancel_watcher = {
            let run_token = run_token.clone();
            tokio::spawn(async move {
                run_token.cancelled().await;
                for token in worker_tokens {
                    token.cancel();
                }
            })
        };

        // Aggregate: wait for every future to settle
        let settled = join_all(
            handles
                .into_iter()
                .map(|(batch_id, handle)| async move { (batch_id, handle.join().await) }),
        )
        .await;

        let mut outcomes = Vec::with_capacity(num_batches);
        for (batch_id, joined) in settled {
            match joined {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    // Never started: the slot was cancelled while queued
                    let _ = manager.cancel_batch(&batch_id).await;
                    outcomes.push(BatchOutcome {
                        error: Some("cancelled before start".into()),
                        ..BatchOutcome::empty(&batch_id, BatchOutcomeStatus::Cancelled)
                    });
                }
            }
        }
        cancel_watcher.abort();
        outcomes.sort_by_key(|o| o.batch_number);

        if run_token.is_cancelled() {
            // The job row already holds the cancellation (or timeout) error.
            return Err(JobError::Cancelled(job_id.clone()));
        }

        let success_count: i64 = outcomes.iter().map(|o| o.success_count).sum();
        let error_count: i64 = outcomes.iter().map(|o| o.error_count).sum();
        let failed_batches = outcomes
            .iter()
            .filter(|o| o.status == BatchOutcomeStatus::Failed)
            .count();
        let all_errors: Vec<Value> = outcomes.iter().flat_map(|o| o.errors.clone()).collect();

        // Finalize over the accumulated per-item outputs, in batch order
        let flat_results: Vec<Value> = outcomes
            .iter()
            .filter(|o| o.status == BatchOutcomeStatus::Completed)
            .flat_map(|o| o.results.clone())
            .collect();
        let finalize_extra = definition.finalize(&ctx, &flat_results).await?;

        // Decision
        if failed_batches >= CONSECUTIVE_FAILURE_THRESHOLD {
            return self
                .requeue(job, failed_batches, success_count, error_count, total_items)
                .await;
        }

        let mut result = json!({
            "status": if failed_batches == 0 { "completed" } else { "completed_with_errors" },
            "success_count": success_count,
            "error_count": error_count,
            "total_items": total_items,
            "failed_batches": failed_batches,
            "errors": all_errors,
        });
        if let Some(extra) = finalize_extra {
            merge_result(&mut result, extra);
        }

        let final_snapshot = ProgressSnapshot::new((success_count + error_count) as u64, total_items)
            .with_phase("complete");
        self.update_with_retry(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Success),
                progress: Some(final_snapshot.clone()),
                result: Some(result.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.progress
            .publish_completion(job_id, "SUCCESS", Some(&result), None)
            .await;

        info!(
            "Job {} completed: {} succeeded, {} failed, {} batches failed",
            job_id, success_count, error_count, failed_batches
        );
        Ok(result)
    }

    /// Empty discovery: terminal SUCCESS with zeroed counters, still
    /// running finalize so count-shaped results come back zeroed
    async fn finish_empty(
        &self,
        job_id: &str,
        ctx: &JobContext,
        definition: &Arc<dyn JobDefinition>,
    ) -> Result<Value, JobError> {
        let mut result = json!({
            "status": "completed",
            "message": "No items to process",
            "success_count": 0,
            "error_count": 0,
            "total_items": 0,
        });
        if let Some(extra) = definition.finalize(ctx, &[]).await? {
            merge_result(&mut result, extra);
        }

        self.update_with_retry(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Success),
                progress: Some(ProgressSnapshot::new(0, 0).with_phase("complete")),
                result: Some(result.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.progress
            .publish_completion(job_id, "SUCCESS", Some(&result), None)
            .await;
        Ok(result)
    }

    /// Too many failed batches: fail this run and queue a continuation
    /// with the same parameters (tagging resumes in untagged-only mode)
    async fn requeue(
        self: &Arc<Self>,
        job: &Job,
        failed_batches: usize,
        success_count: i64,
        error_count: i64,
        total_items: u64,
    ) -> Result<Value, JobError> {
        let reason = format!("auto-requeued: {} batch failures", failed_batches);
        warn!("Job {}: {}", job.id, reason);

        let mut params = job.parameters.clone();
        if !params.is_object() {
            params = json!({});
        }
        if job.job_type == "auto_tag" {
            // untagged_only naturally resumes from where the run stopped
            params["tag_mode"] = json!("untagged_only");
            let prior = params.get("images_tagged").and_then(|v| v.as_i64()).unwrap_or(0);
            params["images_tagged"] = json!(prior + success_count);
        }

        let continuation = Job::new(job.job_type.clone(), job.catalog_id.clone(), params)
            .map_err(|e| JobError::Fatal(e.to_string()))?;
        self.repository.create_job(&continuation).await?;

        let result = json!({
            "status": "requeued",
            "failed_batches": failed_batches,
            "success_count": success_count,
            "error_count": error_count,
            "total_items": total_items,
            "requeued_job_id": continuation.id.clone(),
            "message": format!("Job requeued due to {} batch failures", failed_batches),
        });

        self.update_with_retry(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Failure),
                result: Some(result.clone()),
                error: Some(reason.clone()),
                ..Default::default()
            },
        )
        .await?;
        self.progress
            .publish_completion(&job.id, "FAILURE", None, Some(&reason))
            .await;

        info!(
            "Queued continuation job {} for failed job {}",
            continuation.id, job.id
        );
        let controller = self.clone();
        let continuation_id = continuation.id;
        tokio::spawn(async move {
            if let Err(e) = controller.run(continuation_id.clone()).await {
                error!("Continuation job {} failed: {}", continuation_id, e);
            }
        });

        Ok(result)
    }

    /// Marks a job FAILURE and publishes the stored terminal payload.
    /// No-op on already-terminal rows, so a cancelled job keeps its error.
    async fn mark_failure(&self, job_id: &str, error_message: &str) {
        let update = JobUpdate {
            status: Some(JobStatus::Failure),
            error: Some(error_message.to_string()),
            ..Default::default()
        };
        if let Err(e) = self.repository.update_job(job_id, update).await {
            error!("Failed to record failure of job {}: {}", job_id, e);
            return;
        }
        // Publish what the row actually holds; a lost race with cancel
        // keeps the cancellation error.
        let stored_error = match self.repository.get_job(job_id).await {
            Ok(Some(job)) => job.error,
            _ => Some(error_message.to_string()),
        };
        self.progress
            .publish_completion(job_id, "FAILURE", None, stored_error.as_deref())
            .await;
    }

    async fn update_with_retry(&self, job_id: &str, update: JobUpdate) -> Result<(), JobError> {
        let repository = self.repository.clone();
        let job_id = job_id.to_string();
        with_transient_retry(self.config.max_retries, move || {
            let repository = repository.clone();
            let job_id = job_id.clone();
            let update = update.clone();
            async move { Ok(repository.update_job(&job_id, update).await?) }
        })
        .await
    }
}

/// Merges a finalize map into the overall result object
fn merge_result(result: &mut Value, extra: Value) {
    if let (Some(result_map), Value::Object(extra_map)) = (result.as_object_mut(), extra) {
        for (key, value) in extra_map {
            result_map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_patterns_match() {
        assert!(is_transient_error("Database error: connection refused"));
        assert!(is_transient_error("Request Timeout"));
        assert!(is_transient_error("resource temporarily unavailable"));
        assert!(is_transient_error("deadlock detected"));
        assert!(is_transient_error("database is locked"));
        assert!(!is_transient_error("no such table: jobs"));
        assert!(!is_transient_error("invalid parameters"));
    }

    #[tokio::test]
    async fn test_non_transient_error_surfaces_immediately() {
        let mut calls = 0;
        let result: Result<(), JobError> = with_transient_retry(3, || {
            calls += 1;
            async move { Err(JobError::Process("invalid input".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let result = with_transient_retry(3, || async { Ok::<_, JobError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_merge_result_overlays_keys() {
        let mut result = json!({"status": "completed", "success_count": 2});
        merge_result(&mut result, json!({"total_files": 2, "status": "completed"}));
        assert_eq!(result["total_files"], 2);
        assert_eq!(result["success_count"], 2);
    }
}
