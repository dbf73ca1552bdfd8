//! Job DTOs
//!
//! Data Transfer Objects for the jobs API. Status strings use the
//! uppercase wire set; `STARTED` may appear as a tagging sub-status and
//! is accepted by clients as `PROGRESS`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entities::Job;

/// Job submission request
#[derive(Debug, Clone, Deserialize)]
pub struct JobSubmitRequest {
    /// Registered job type name
    pub job_type: String,
    /// Catalog to process (optional for non-catalog jobs)
    pub catalog_id: Option<String>,
    /// Parameters captured for the run
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Job response DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    /// Job ID
    pub id: String,
    /// Catalog ID
    pub catalog_id: Option<String>,
    /// Job type name
    pub job_type: String,
    /// Wire status (PENDING, PROGRESS, SUCCESS, FAILURE)
    pub status: String,
    /// Latest progress snapshot
    pub progress: Value,
    /// Result map (meaningful on SUCCESS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (meaningful on FAILURE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Created at timestamp (ISO 8601)
    pub created_at: String,
    /// Completed at timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            catalog_id: job.catalog_id,
            job_type: job.job_type,
            status: job.status.as_str().to_string(),
            progress: serde_json::to_value(&job.progress).unwrap_or(Value::Null),
            result: job.result,
            error: job.error,
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Cancellation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_request_defaults_parameters() {
        let request: JobSubmitRequest =
            serde_json::from_value(json!({"job_type": "scan", "catalog_id": "cat-1"})).unwrap();
        assert_eq!(request.job_type, "scan");
        assert!(request.parameters.is_object());
    }

    #[test]
    fn test_job_response_uses_wire_status() {
        let job = Job::new("scan", Some("cat-1".into()), json!({})).unwrap();
        let response = JobResponse::from(job);
        assert_eq!(response.status, "PENDING");
        assert_eq!(response.progress["current"], 0);
    }
}
