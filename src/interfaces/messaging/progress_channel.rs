// Progress Channel Interface
//
// Soft-real-time progress fan-out plus a persistent last-known snapshot.
// Publishers upsert the latest payload per job and emit a notification on
// a per-job channel; consumers either subscribe or poll the snapshot.
//
// Publish operations must fail gracefully: a broken store may cost an
// update, never destabilise the caller. Subscribers are not guaranteed
// every event; consumers that need the latest state must also poll
// `get_last_progress` on reconnect.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::value_objects::ProgressSnapshot;

/// Name of the per-job notification channel
pub fn progress_channel_name(job_id: &str) -> String {
    format!("job_progress_{}", job_id)
}

/// Wire timestamp: ISO-8601 in UTC without an offset suffix ("naive UTC",
/// kept for compatibility with existing consumers)
pub fn wire_timestamp() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Builds the JSON payload for a progress update
pub fn build_progress_payload(job_id: &str, state: &str, snapshot: &ProgressSnapshot) -> Value {
    json!({
        "job_id": job_id,
        "status": state,
        "progress": snapshot,
        "timestamp": wire_timestamp(),
    })
}

/// Builds the JSON payload for a terminal update
///
/// SUCCESS carries `result`; FAILURE carries `result: {error: ...}`.
pub fn build_completion_payload(
    job_id: &str,
    state: &str,
    result: Option<&Value>,
    error: Option<&str>,
) -> Value {
    let mut payload = json!({
        "job_id": job_id,
        "status": state,
        "timestamp": wire_timestamp(),
    });
    if state == "SUCCESS" {
        if let Some(result) = result {
            payload["result"] = result.clone();
        }
    } else if state == "FAILURE" {
        if let Some(error) = error {
            payload["result"] = json!({ "error": error });
        }
    }
    payload
}

/// Handle for receiving notifications on one job's channel
///
/// Dropping the subscriber unsubscribes and releases its connection.
#[async_trait]
pub trait ProgressSubscriber: Send {
    /// Returns the next published payload, or `None` when `timeout`
    /// elapses without a message
    async fn next_message(&mut self, timeout: Duration) -> Option<Value>;
}

/// Progress channel interface
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one channel instance is shared
/// across all controllers and workers.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Upserts the job's snapshot and notifies subscribers
    ///
    /// Returns false (after logging) when the update could not be stored;
    /// callers never fail because of a progress publish.
    async fn publish_progress(&self, job_id: &str, state: &str, snapshot: &ProgressSnapshot)
        -> bool;

    /// Publishes a terminal payload (`SUCCESS` or `FAILURE`)
    async fn publish_completion(
        &self,
        job_id: &str,
        state: &str,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> bool;

    /// Reads the latest stored snapshot for a job
    async fn get_last_progress(&self, job_id: &str) -> Option<Value>;

    /// Subscribes to the job's notification channel
    async fn subscribe(&self, job_id: &str) -> Box<dyn ProgressSubscriber>;

    /// Deletes snapshots older than `max_age_hours`, returning the number
    /// removed
    async fn cleanup_old(&self, max_age_hours: i64) -> u64;
}
