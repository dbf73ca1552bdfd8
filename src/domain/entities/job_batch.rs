//! JobBatch entity
//!
//! One contiguous slice of a job's work items. Batches exist only for the
//! duration of a run; a requeued job gets fresh batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::BatchStatus;

/// JobBatch entity - tracks one batch of work for a parent job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBatch {
    /// Unique identifier (UUID string)
    pub id: String,
    /// The job this batch belongs to
    pub parent_job_id: String,
    /// Catalog reference, denormalized for query convenience
    pub catalog_id: Option<String>,
    /// Job type, denormalized for query convenience
    pub job_type: String,
    /// 0-based index within the job
    pub batch_number: i64,
    /// Total batches created for the job, fixed at creation
    pub total_batches: i64,
    /// Current status
    pub status: BatchStatus,
    /// Opaque work items, serialized as a JSON array
    pub work_items: Vec<Value>,
    /// Number of work items (immutable, equals `work_items.len()`)
    pub items_count: i64,
    /// Worker that claimed the batch (None until claimed)
    pub worker_id: Option<String>,
    /// Items attempted so far
    pub processed_count: i64,
    /// Items that succeeded
    pub success_count: i64,
    /// Items that errored
    pub error_count: i64,
    /// Aggregated per-batch output consumed by finalize
    pub results: Value,
    /// Error message, set when the batch fails
    pub error_message: Option<String>,
    /// When the batch was claimed
    pub started_at: Option<DateTime<Utc>>,
    /// When the batch reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// When the batch was last updated
    pub updated_at: DateTime<Utc>,
}

impl JobBatch {
    /// Creates a new pending batch for a slice of work items
    pub fn new(
        parent_job_id: impl Into<String>,
        catalog_id: Option<String>,
        job_type: impl Into<String>,
        batch_number: i64,
        total_batches: i64,
        work_items: Vec<Value>,
    ) -> Self {
        let items_count = work_items.len() as i64;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_job_id: parent_job_id.into(),
            catalog_id,
            job_type: job_type.into(),
            batch_number,
            total_batches,
            status: BatchStatus::Pending,
            work_items,
            items_count,
            worker_id: None,
            processed_count: 0,
            success_count: 0,
            error_count: 0,
            results: Value::Null,
            error_message: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Items that were attempted but neither succeeded nor errored
    /// (e.g. tag results below the storage threshold)
    pub fn skipped_count(&self) -> i64 {
        (self.processed_count - self.success_count - self.error_count).max(0)
    }
}

/// Counters written when a batch completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub processed_count: i64,
    pub success_count: i64,
    pub error_count: i64,
}

/// Payload returned by a successful batch claim
///
/// Contains everything a worker needs to process the batch without
/// re-reading the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedBatch {
    pub batch_id: String,
    pub batch_number: i64,
    pub total_batches: i64,
    pub work_items: Vec<Value>,
    pub items_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_batch_counts_items() {
        let batch = JobBatch::new(
            "job-1",
            Some("cat-1".into()),
            "scan",
            0,
            2,
            vec![json!("a"), json!("b"), json!("c")],
        );
        assert_eq!(batch.status, BatchStatus::Pending);
        assert_eq!(batch.items_count, 3);
        assert!(batch.worker_id.is_none());
    }

    #[test]
    fn test_skipped_count_is_derived() {
        let mut batch = JobBatch::new("job-1", None, "auto_tag", 0, 1, vec![json!(1)]);
        batch.processed_count = 10;
        batch.success_count = 7;
        batch.error_count = 1;
        assert_eq!(batch.skipped_count(), 2);
        assert_eq!(
            batch.processed_count,
            batch.success_count + batch.error_count + batch.skipped_count()
        );
    }
}
