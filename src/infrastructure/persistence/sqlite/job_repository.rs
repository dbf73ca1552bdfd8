//! SQLite Job Repository Implementation
//!
//! Persistence for jobs and job batches. Every multi-row mutation runs in
//! one transaction; the batch claim is a single conditional UPDATE so at
//! most one worker wins. Status transitions are enforced here so terminal
//! rows never move backwards, even under cancel/complete races.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::debug;

use crate::domain::entities::{BatchCounters, ClaimedBatch, Job, JobBatch};
use crate::domain::repositories::{JobFilter, JobRepository, JobUpdate};
use crate::domain::value_objects::{AggregateProgress, BatchStatus, JobStatus, ProgressSnapshot};
use crate::shared::error::RepositoryError;

/// SQLite implementation of JobRepository
pub struct SqliteJobRepository {
    pool: Pool<Sqlite>,
}

impl SqliteJobRepository {
    /// Creates a new SQLite job repository
    ///
    /// # Arguments
    /// * `pool` - SQLite connection pool
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Maps a database row to a Job entity
    fn map_row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, RepositoryError> {
        let status_str: String = row.try_get("status")?;
        let parameters: String = row.try_get("parameters")?;
        let progress: String = row.try_get("progress")?;
        let result: Option<String> = row.try_get("result")?;

        Ok(Job {
            id: row.try_get("id")?,
            catalog_id: row.try_get("catalog_id")?,
            job_type: row.try_get("job_type")?,
            status: JobStatus::from_str(&status_str)?,
            parameters: serde_json::from_str(&parameters)?,
            progress: serde_json::from_str::<ProgressSnapshot>(&progress)?,
            result: result.map(|r| serde_json::from_str(&r)).transpose()?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    /// Maps a database row to a JobBatch entity
    fn map_row_to_batch(row: sqlx::sqlite::SqliteRow) -> Result<JobBatch, RepositoryError> {
        let status_str: String = row.try_get("status")?;
        let work_items: String = row.try_get("work_items")?;
        let results: Option<String> = row.try_get("results")?;

        Ok(JobBatch {
            id: row.try_get("id")?,
            parent_job_id: row.try_get("parent_job_id")?,
            catalog_id: row.try_get("catalog_id")?,
            job_type: row.try_get("job_type")?,
            batch_number: row.try_get("batch_number")?,
            total_batches: row.try_get("total_batches")?,
            status: BatchStatus::from_str(&status_str)?,
            work_items: serde_json::from_str(&work_items)?,
            items_count: row.try_get("items_count")?,
            worker_id: row.try_get("worker_id")?,
            processed_count: row.try_get("processed_count")?,
            success_count: row.try_get("success_count")?,
            error_count: row.try_get("error_count")?,
            results: results
                .map(|r| serde_json::from_str(&r))
                .transpose()?
                .unwrap_or(Value::Null),
            error_message: row.try_get("error_message")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create_job(&self, job: &Job) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, catalog_id, job_type, status, parameters, progress,
                              result, error, created_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.catalog_id)
        .bind(&job.job_type)
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.parameters)?)
        .bind(serde_json::to_string(&job.progress)?)
        .bind(
            job.result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(format!("job {}", job_id)));
        };
        let current = JobStatus::from_str(&row.try_get::<String, _>("status")?)?;

        let mut status_to_write: Option<JobStatus> = None;
        if let Some(next) = update.status {
            if next != current {
                if current.is_terminal() {
                    // Terminal rows never move; a late completion racing a
                    // cancel keeps the cancelled outcome and its error.
                    debug!(
                        "Skipping update of terminal job {} ({} -> {})",
                        job_id, current, next
                    );
                    tx.commit().await?;
                    return Ok(());
                }
                if !current.can_transition_to(next) {
                    return Err(RepositoryError::ConstraintViolation(format!(
                        "invalid job transition {} -> {}",
                        current, next
                    )));
                }
                status_to_write = Some(next);
            }
        }

        let now = Utc::now();
        let becomes_terminal = status_to_write.map(|s| s.is_terminal()).unwrap_or(false);

        sqlx::query(
            r#"
            UPDATE jobs SET
                status = COALESCE(?, status),
                progress = COALESCE(?, progress),
                result = COALESCE(?, result),
                error = COALESCE(?, error),
                updated_at = ?,
                completed_at = CASE WHEN ? THEN ? ELSE completed_at END
            WHERE id = ?
            "#,
        )
        .bind(status_to_write.map(|s| s.as_str()))
        .bind(
            update
                .progress
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            update
                .result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(update.error)
        .bind(now)
        .bind(becomes_terminal)
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        let result = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        match result {
            Some(row) => Ok(Some(Self::map_row_to_job(row)?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, RepositoryError> {
        let rows = match &filter.catalog_id {
            Some(catalog_id) => {
                sqlx::query(
                    "SELECT * FROM jobs WHERE catalog_id = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(catalog_id)
                .bind(filter.limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?")
                    .bind(filter.limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(Self::map_row_to_job(row)?);
        }
        Ok(jobs)
    }

    async fn create_batches(&self, batches: &[JobBatch]) -> Result<Vec<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(batches.len());

        for batch in batches {
            sqlx::query(
                r#"
                INSERT INTO job_batches (id, parent_job_id, catalog_id, job_type,
                                         batch_number, total_batches, status, work_items,
                                         items_count, worker_id, processed_count,
                                         success_count, error_count, results, error_message,
                                         started_at, completed_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0, 0, 0, NULL, NULL, NULL, NULL, ?)
                "#,
            )
            .bind(&batch.id)
            .bind(&batch.parent_job_id)
            .bind(&batch.catalog_id)
            .bind(&batch.job_type)
            .bind(batch.batch_number)
            .bind(batch.total_batches)
            .bind(batch.status.as_str())
            .bind(serde_json::to_string(&batch.work_items)?)
            .bind(batch.items_count)
            .bind(batch.updated_at)
            .execute(&mut *tx)
            .await?;
            ids.push(batch.id.clone());
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn claim_batch(
        &self,
        batch_id: &str,
        worker_id: &str,
    ) -> Result<Option<ClaimedBatch>, RepositoryError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE job_batches
            SET status = 'running', worker_id = ?, started_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING id, batch_number, total_batches, work_items, items_count
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(now)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let work_items: String = row.try_get("work_items")?;
                Ok(Some(ClaimedBatch {
                    batch_id: row.try_get("id")?,
                    batch_number: row.try_get("batch_number")?,
                    total_batches: row.try_get("total_batches")?,
                    work_items: serde_json::from_str(&work_items)?,
                    items_count: row.try_get("items_count")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn complete_batch(
        &self,
        batch_id: &str,
        counters: BatchCounters,
        results: &Value,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE job_batches
            SET status = 'completed', processed_count = ?, success_count = ?,
                error_count = ?, results = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(counters.processed_count)
        .bind(counters.success_count)
        .bind(counters.error_count)
        .bind(serde_json::to_string(results)?)
        .bind(now)
        .bind(now)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.require_terminal_or_missing(batch_id, "complete").await?;
        }
        Ok(())
    }

    async fn fail_batch(
        &self,
        batch_id: &str,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE job_batches
            SET status = 'failed', error_message = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.require_terminal_or_missing(batch_id, "fail").await?;
        }
        Ok(())
    }

    async fn cancel_batch(&self, batch_id: &str) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE job_batches
            SET status = 'cancelled', completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.require_terminal_or_missing(batch_id, "cancel").await?;
        }
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<JobBatch>, RepositoryError> {
        let result = sqlx::query("SELECT * FROM job_batches WHERE id = ?")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        match result {
            Some(row) => Ok(Some(Self::map_row_to_batch(row)?)),
            None => Ok(None),
        }
    }

    async fn aggregate_progress(
        &self,
        parent_job_id: &str,
    ) -> Result<AggregateProgress, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_batches,
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_batches,
                   COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed_batches,
                   COALESCE(SUM(items_count), 0) AS total_items,
                   COALESCE(SUM(success_count), 0) AS success_items,
                   COALESCE(SUM(error_count), 0) AS error_items
            FROM job_batches
            WHERE parent_job_id = ?
            "#,
        )
        .bind(parent_job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(AggregateProgress {
            total_batches: row.try_get::<i64, _>("total_batches")? as u64,
            completed_batches: row.try_get::<i64, _>("completed_batches")? as u64,
            failed_batches: row.try_get::<i64, _>("failed_batches")? as u64,
            total_items: row.try_get::<i64, _>("total_items")? as u64,
            success_items: row.try_get::<i64, _>("success_items")? as u64,
            error_items: row.try_get::<i64, _>("error_items")? as u64,
        })
    }

    async fn is_cancelled(&self, job_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let status = JobStatus::from_str(&row.try_get::<String, _>("status")?)?;
                Ok(status == JobStatus::Failure)
            }
            None => Ok(false),
        }
    }

    async fn cleanup_old_jobs(&self, max_age_hours: i64) -> Result<u64, RepositoryError> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::hours(max_age_hours);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM job_batches WHERE parent_job_id IN (
                SELECT id FROM jobs
                WHERE status IN ('SUCCESS', 'FAILURE') AND completed_at < ?
            )
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('SUCCESS', 'FAILURE') AND completed_at < ?",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

impl SqliteJobRepository {
    /// After a conditional transition touched no rows: fine when the batch
    /// is already terminal (idempotent under retry), an error otherwise.
    async fn require_terminal_or_missing(
        &self,
        batch_id: &str,
        operation: &str,
    ) -> Result<(), RepositoryError> {
        let row = sqlx::query("SELECT status FROM job_batches WHERE id = ?")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let status = BatchStatus::from_str(&row.try_get::<String, _>("status")?)?;
                if status.is_terminal() {
                    debug!(
                        "Skipping {} of batch {}: already {}",
                        operation, batch_id, status
                    );
                    Ok(())
                } else {
                    Err(RepositoryError::ConstraintViolation(format!(
                        "cannot {} batch {} in status {}",
                        operation, batch_id, status
                    )))
                }
            }
            None => Err(RepositoryError::NotFound(format!("batch {}", batch_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::initialize_schema;
    use assert_matches::assert_matches;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteJobRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        SqliteJobRepository::new(pool)
    }

    fn sample_job() -> Job {
        Job::new("scan", Some("cat-1".into()), json!({"workers": 2})).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();

        let loaded = repo.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.parameters, json!({"workers": 2}));
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_job_is_not_found() {
        let repo = setup().await;
        let err = repo
            .update_job("nope", JobUpdate::default())
            .await
            .unwrap_err();
        assert_matches!(err, RepositoryError::NotFound(_));
    }

    #[tokio::test]
    async fn test_terminal_transition_stamps_completed_at() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();

        repo.update_job(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Progress),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        repo.update_job(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Success),
                result: Some(json!({"total_files": 0})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let loaded = repo.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Success);
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.result.unwrap()["total_files"], 0);
    }

    #[tokio::test]
    async fn test_terminal_job_never_moves() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();

        repo.update_job(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Failure),
                error: Some("Job cancelled by user".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // A racing completion is silently dropped.
        repo.update_job(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Success),
                result: Some(json!({"late": true})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let loaded = repo.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failure);
        assert_eq!(loaded.error.as_deref(), Some("Job cancelled by user"));
        assert!(loaded.result.is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_catalog() {
        let repo = setup().await;
        let a = Job::new("scan", Some("cat-a".into()), json!({})).unwrap();
        let b = Job::new("scan", Some("cat-b".into()), json!({})).unwrap();
        repo.create_job(&a).await.unwrap();
        repo.create_job(&b).await.unwrap();

        let all = repo.list_jobs(JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let only_a = repo
            .list_jobs(JobFilter {
                catalog_id: Some("cat-a".into()),
                limit: 50,
            })
            .await
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].id, a.id);
    }

    fn sample_batches(job: &Job, items_per_batch: &[usize]) -> Vec<JobBatch> {
        let total = items_per_batch.len() as i64;
        items_per_batch
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let items = (0..count).map(|n| json!(format!("item-{}-{}", i, n))).collect();
                JobBatch::new(
                    job.id.clone(),
                    job.catalog_id.clone(),
                    job.job_type.clone(),
                    i as i64,
                    total,
                    items,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_claim_batch() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        let batches = sample_batches(&job, &[3, 2]);
        let ids = repo.create_batches(&batches).await.unwrap();
        assert_eq!(ids.len(), 2);

        let claimed = repo.claim_batch(&ids[0], "worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.batch_number, 0);
        assert_eq!(claimed.total_batches, 2);
        assert_eq!(claimed.items_count, 3);
        assert_eq!(claimed.work_items.len(), 3);

        // Second claim returns nothing
        assert!(repo.claim_batch(&ids[0], "worker-2").await.unwrap().is_none());

        let batch = repo.get_batch(&ids[0]).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Running);
        assert_eq!(batch.worker_id.as_deref(), Some("worker-1"));
        assert!(batch.started_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let repo = std::sync::Arc::new(setup().await);
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        let ids = repo
            .create_batches(&sample_batches(&job, &[1]))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let repo = repo.clone();
            let batch_id = ids[0].clone();
            handles.push(tokio::spawn(async move {
                repo.claim_batch(&batch_id, &format!("worker-{}", n)).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_complete_batch_and_aggregate() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        let ids = repo
            .create_batches(&sample_batches(&job, &[3, 2]))
            .await
            .unwrap();

        repo.claim_batch(&ids[0], "w1").await.unwrap().unwrap();
        repo.complete_batch(
            &ids[0],
            BatchCounters {
                processed_count: 3,
                success_count: 2,
                error_count: 1,
            },
            &json!({"items": ["a", "b"]}),
        )
        .await
        .unwrap();

        repo.claim_batch(&ids[1], "w2").await.unwrap().unwrap();
        repo.fail_batch(&ids[1], "boom").await.unwrap();

        let progress = repo.aggregate_progress(&job.id).await.unwrap();
        assert_eq!(progress.total_batches, 2);
        assert_eq!(progress.completed_batches, 1);
        assert_eq!(progress.failed_batches, 1);
        assert_eq!(progress.total_items, 5);
        assert_eq!(progress.success_items, 2);
        assert_eq!(progress.error_items, 1);

        let completed = repo.get_batch(&ids[0]).await.unwrap().unwrap();
        assert_eq!(
            completed.processed_count,
            completed.success_count + completed.error_count + completed.skipped_count()
        );
        let failed = repo.get_batch(&ids[1]).await.unwrap().unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent_on_terminal_batch() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        let ids = repo
            .create_batches(&sample_batches(&job, &[1]))
            .await
            .unwrap();
        repo.claim_batch(&ids[0], "w1").await.unwrap().unwrap();

        let counters = BatchCounters {
            processed_count: 1,
            success_count: 1,
            error_count: 0,
        };
        repo.complete_batch(&ids[0], counters, &Value::Null).await.unwrap();
        // Retried completion after a transient error is a no-op
        repo.complete_batch(&ids[0], counters, &Value::Null).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_batch_from_pending() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        let ids = repo
            .create_batches(&sample_batches(&job, &[1]))
            .await
            .unwrap();

        repo.cancel_batch(&ids[0]).await.unwrap();
        let batch = repo.get_batch(&ids[0]).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);

        // Cancelled batches can no longer be claimed
        assert!(repo.claim_batch(&ids[0], "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_is_cancelled_tracks_failure_status() {
        let repo = setup().await;
        let job = sample_job();
        repo.create_job(&job).await.unwrap();
        assert!(!repo.is_cancelled(&job.id).await.unwrap());

        repo.update_job(
            &job.id,
            JobUpdate {
                status: Some(JobStatus::Failure),
                error: Some("Job cancelled by user".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(repo.is_cancelled(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_old_jobs_removes_terminal_rows() {
        let repo = setup().await;
        let mut old_job = sample_job();
        old_job.status = JobStatus::Success;
        old_job.completed_at = Some(Utc::now() - Duration::hours(48));
        repo.create_job(&old_job).await.unwrap();
        repo.create_batches(&sample_batches(&old_job, &[1]))
            .await
            .unwrap();

        let fresh_job = sample_job();
        repo.create_job(&fresh_job).await.unwrap();

        let removed = repo.cleanup_old_jobs(24).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get_job(&old_job.id).await.unwrap().is_none());
        assert!(repo.get_job(&fresh_job.id).await.unwrap().is_some());
        assert_eq!(
            repo.aggregate_progress(&old_job.id).await.unwrap().total_batches,
            0
        );
    }
}
