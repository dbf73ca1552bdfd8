//! Batch Manager
//!
//! Batch-centric facade over the job repository used by workers and the
//! controller. Every mutating operation publishes a progress snapshot
//! after its transaction commits, so subscribers track the aggregate as
//! batches settle.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::domain::entities::{BatchCounters, ClaimedBatch, JobBatch};
use crate::domain::repositories::JobRepository;
use crate::domain::value_objects::{AggregateProgress, ProgressSnapshot};
use crate::interfaces::messaging::ProgressChannel;
use crate::shared::error::JobError;

/// Batch operations for one job run
pub struct BatchManager {
    repository: Arc<dyn JobRepository>,
    progress: Arc<dyn ProgressChannel>,
    parent_job_id: String,
    catalog_id: Option<String>,
    job_type: String,
}

impl BatchManager {
    /// Creates a batch manager bound to one job run
    pub fn new(
        repository: Arc<dyn JobRepository>,
        progress: Arc<dyn ProgressChannel>,
        parent_job_id: impl Into<String>,
        catalog_id: Option<String>,
        job_type: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            progress,
            parent_job_id: parent_job_id.into(),
            catalog_id,
            job_type: job_type.into(),
        }
    }

    /// The job this manager belongs to
    pub fn parent_job_id(&self) -> &str {
        &self.parent_job_id
    }

    /// Partitions work items into contiguous batches and persists them
    ///
    /// Every batch except possibly the last holds exactly `batch_size`
    /// items; concatenating the slices reproduces the input order. Returns
    /// the batch ids in batch-number order.
    pub async fn create_batches(
        &self,
        work_items: Vec<Value>,
        batch_size: usize,
    ) -> Result<Vec<String>, JobError> {
        if batch_size == 0 {
            return Err(JobError::Fatal("batch_size must be positive".into()));
        }

        let total_batches = work_items.len().div_ceil(batch_size) as i64;
        let batches: Vec<JobBatch> = work_items
            .chunks(batch_size)
            .enumerate()
            .map(|(number, chunk)| {
                JobBatch::new(
                    self.parent_job_id.clone(),
                    self.catalog_id.clone(),
                    self.job_type.clone(),
                    number as i64,
                    total_batches,
                    chunk.to_vec(),
                )
            })
            .collect();

        let ids = self.repository.create_batches(&batches).await?;
        info!(
            "Created {} batches for job {}",
            ids.len(),
            self.parent_job_id
        );
        Ok(ids)
    }

    /// Claims a batch for a worker; `None` when already claimed
    pub async fn claim_batch(
        &self,
        batch_id: &str,
        worker_id: &str,
    ) -> Result<Option<ClaimedBatch>, JobError> {
        Ok(self.repository.claim_batch(batch_id, worker_id).await?)
    }

    /// Completes a batch and publishes the new aggregate
    pub async fn complete_batch(
        &self,
        batch_id: &str,
        counters: BatchCounters,
        results: &Value,
        message: &str,
    ) -> Result<(), JobError> {
        self.repository
            .complete_batch(batch_id, counters, results)
            .await?;
        self.publish_snapshot(message, "processing").await;
        Ok(())
    }

    /// Fails a batch and publishes the new aggregate
    pub async fn fail_batch(&self, batch_id: &str, error_message: &str) -> Result<(), JobError> {
        self.repository.fail_batch(batch_id, error_message).await?;
        self.publish_snapshot("Batch failed", "processing").await;
        Ok(())
    }

    /// Records a batch as cancelled
    pub async fn cancel_batch(&self, batch_id: &str) -> Result<(), JobError> {
        Ok(self.repository.cancel_batch(batch_id).await?)
    }

    /// True when the parent job has reached a terminal status
    ///
    /// Workers call this before a batch and between items; a cancelled job
    /// is terminal (FAILURE), so in-flight batches stop at the next check.
    pub async fn is_cancelled(&self) -> Result<bool, JobError> {
        match self.repository.get_job(&self.parent_job_id).await? {
            Some(job) => Ok(job.is_terminal()),
            None => Ok(false),
        }
    }

    /// Aggregate progress over all batches of the job
    pub async fn get_progress(&self) -> Result<AggregateProgress, JobError> {
        Ok(self
            .repository
            .aggregate_progress(&self.parent_job_id)
            .await?)
    }

    /// Publishes the current aggregate as a progress snapshot
    ///
    /// Best-effort: a publish failure never fails the batch operation that
    /// triggered it.
    pub async fn publish_snapshot(&self, message: &str, phase: &str) {
        let Ok(progress) = self.get_progress().await else {
            return;
        };
        let snapshot = ProgressSnapshot::new(progress.processed_items(), progress.total_items)
            .with_message(message)
            .with_phase(phase)
            .with_extra("batches_total", json!(progress.total_batches))
            .with_extra("batches_completed", json!(progress.completed_batches))
            .with_extra("batches_failed", json!(progress.failed_batches));
        self.progress
            .publish_progress(&self.parent_job_id, "PROGRESS", &snapshot)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Job;
    use crate::infrastructure::database::initialize_schema;
    use crate::infrastructure::messaging::InMemoryProgressChannel;
    use crate::infrastructure::persistence::sqlite::SqliteJobRepository;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup(job: &Job) -> BatchManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        let repository = Arc::new(SqliteJobRepository::new(pool));
        repository.create_job(job).await.unwrap();
        BatchManager::new(
            repository,
            Arc::new(InMemoryProgressChannel::new()),
            job.id.clone(),
            job.catalog_id.clone(),
            job.job_type.clone(),
        )
    }

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!(format!("item-{}", i))).collect()
    }

    #[tokio::test]
    async fn test_partitioning_properties() {
        let job = Job::new("scan", None, json!({})).unwrap();
        let manager = setup(&job).await;

        let ids = manager.create_batches(items(7), 3).await.unwrap();
        assert_eq!(ids.len(), 3); // ceil(7 / 3)

        // Claim all batches and check the partition reassembles the input
        let mut reassembled = Vec::new();
        for (n, id) in ids.iter().enumerate() {
            let claimed = manager.claim_batch(id, "w").await.unwrap().unwrap();
            assert_eq!(claimed.batch_number, n as i64);
            assert_eq!(claimed.total_batches, 3);
            if n < 2 {
                assert_eq!(claimed.items_count, 3);
            } else {
                assert_eq!(claimed.items_count, 1);
            }
            reassembled.extend(claimed.work_items);
        }
        assert_eq!(reassembled, items(7));
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_short_batch() {
        let job = Job::new("scan", None, json!({})).unwrap();
        let manager = setup(&job).await;
        let ids = manager.create_batches(items(6), 3).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let job = Job::new("scan", None, json!({})).unwrap();
        let manager = setup(&job).await;
        assert!(manager.create_batches(items(3), 0).await.is_err());
    }

    #[tokio::test]
    async fn test_complete_batch_publishes_aggregate() {
        let job = Job::new("scan", None, json!({})).unwrap();
        let manager = setup(&job).await;
        let ids = manager.create_batches(items(2), 2).await.unwrap();

        manager.claim_batch(&ids[0], "w").await.unwrap().unwrap();
        manager
            .complete_batch(
                &ids[0],
                BatchCounters {
                    processed_count: 2,
                    success_count: 2,
                    error_count: 0,
                },
                &json!({"items": []}),
                "Batch 1/1 complete",
            )
            .await
            .unwrap();

        let payload = manager.progress.get_last_progress(&job.id).await.unwrap();
        assert_eq!(payload["progress"]["current"], 2);
        assert_eq!(payload["progress"]["total"], 2);
        assert_eq!(payload["progress"]["batches_completed"], 1);
    }

    #[tokio::test]
    async fn test_is_cancelled_follows_parent_state() {
        let job = Job::new("scan", None, json!({})).unwrap();
        let manager = setup(&job).await;
        assert!(!manager.is_cancelled().await.unwrap());

        manager
            .repository
            .update_job(
                &job.id,
                crate::domain::repositories::JobUpdate {
                    status: Some(crate::domain::value_objects::JobStatus::Failure),
                    error: Some("Job cancelled by user".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(manager.is_cancelled().await.unwrap());
    }
}
