//! Job entity
//!
//! A single job run. Parameters are captured at submission and never
//! change afterwards; a requeue creates a new Job with copied parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{JobStatus, ProgressSnapshot};
use crate::shared::error::DomainError;

/// Job entity - one run of a registered job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Globally unique identifier (UUID string)
    pub id: String,
    /// Catalog being processed (None for non-catalog jobs)
    pub catalog_id: Option<String>,
    /// Name of the registered job definition
    pub job_type: String,
    /// Current status
    pub status: JobStatus,
    /// Submission parameters, sufficient to re-run the job
    pub parameters: Value,
    /// Latest progress snapshot
    pub progress: ProgressSnapshot,
    /// Final result; meaningful only when status is SUCCESS
    pub result: Option<Value>,
    /// Error message; meaningful only when status is FAILURE
    pub error: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a new pending job
    ///
    /// # Errors
    /// Returns error if `job_type` is empty
    pub fn new(
        job_type: impl Into<String>,
        catalog_id: Option<String>,
        parameters: Value,
    ) -> Result<Self, DomainError> {
        let job_type = job_type.into();
        if job_type.is_empty() {
            return Err(DomainError::InvalidInput(
                "Job type cannot be empty".into(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            catalog_id,
            job_type,
            status: JobStatus::Pending,
            parameters,
            progress: ProgressSnapshot::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Checks whether the job has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validates and applies a status transition
    ///
    /// Stamps `completed_at` on the terminal transition, preserving the
    /// invariant that `completed_at` is set iff the status is terminal.
    ///
    /// # Errors
    /// Returns `InvalidState` if the transition would walk backwards.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidState(format!(
                "Cannot transition job {} from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("scan", Some("cat-1".into()), json!({"workers": 2})).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_empty_type_rejected() {
        assert!(Job::new("", None, json!({})).is_err());
    }

    #[test]
    fn test_terminal_transition_stamps_completed_at() {
        let mut job = Job::new("scan", None, json!({})).unwrap();
        job.transition_to(JobStatus::Progress).unwrap();
        assert!(job.completed_at.is_none());
        job.transition_to(JobStatus::Success).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_backwards_transition_rejected() {
        let mut job = Job::new("scan", None, json!({})).unwrap();
        job.transition_to(JobStatus::Progress).unwrap();
        job.transition_to(JobStatus::Failure).unwrap();
        assert!(job.transition_to(JobStatus::Progress).is_err());
        assert!(job.transition_to(JobStatus::Success).is_err());
    }

    #[test]
    fn test_distinct_ids_for_identical_parameters() {
        let a = Job::new("scan", Some("cat".into()), json!({"x": 1})).unwrap();
        let b = Job::new("scan", Some("cat".into()), json!({"x": 1})).unwrap();
        assert_ne!(a.id, b.id);
    }
}
