//! In-Memory Progress Channel
//!
//! Same contract as the database-backed channel without persistence.
//! Used for database-free operation and in tests; snapshots do not
//! survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::value_objects::ProgressSnapshot;
use crate::infrastructure::messaging::notification_hub::NotificationHub;
use crate::infrastructure::messaging::subscriber::BroadcastSubscriber;
use crate::interfaces::messaging::{
    build_completion_payload, build_progress_payload, progress_channel_name, ProgressChannel,
    ProgressSubscriber,
};

/// Progress channel backed by an in-memory map
#[derive(Default)]
pub struct InMemoryProgressChannel {
    storage: RwLock<HashMap<String, (Value, DateTime<Utc>)>>,
    hub: Arc<NotificationHub>,
}

impl InMemoryProgressChannel {
    /// Creates a new in-memory progress channel
    pub fn new() -> Self {
        Self::default()
    }

    async fn store_and_notify(&self, job_id: &str, payload: Value) -> bool {
        self.storage
            .write()
            .await
            .insert(job_id.to_string(), (payload.clone(), Utc::now()));
        self.hub.notify(&progress_channel_name(job_id), payload);
        true
    }
}

#[async_trait]
impl ProgressChannel for InMemoryProgressChannel {
    async fn publish_progress(
        &self,
        job_id: &str,
        state: &str,
        snapshot: &ProgressSnapshot,
    ) -> bool {
        let payload = build_progress_payload(job_id, state, snapshot);
        debug!(
            "Published progress for job {}: {} {}/{}",
            job_id, state, snapshot.current, snapshot.total
        );
        self.store_and_notify(job_id, payload).await
    }

    async fn publish_completion(
        &self,
        job_id: &str,
        state: &str,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> bool {
        let payload = build_completion_payload(job_id, state, result, error);
        debug!("Published completion for job {}: {}", job_id, state);
        self.store_and_notify(job_id, payload).await
    }

    async fn get_last_progress(&self, job_id: &str) -> Option<Value> {
        self.storage
            .read()
            .await
            .get(job_id)
            .map(|(payload, _)| payload.clone())
    }

    async fn subscribe(&self, job_id: &str) -> Box<dyn ProgressSubscriber> {
        let receiver = self.hub.subscribe(&progress_channel_name(job_id));
        Box::new(BroadcastSubscriber::new(receiver))
    }

    async fn cleanup_old(&self, max_age_hours: i64) -> u64 {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut storage = self.storage.write().await;
        let before = storage.len();
        storage.retain(|_, (_, updated_at)| *updated_at >= cutoff);
        (before - storage.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_publish_and_poll() {
        let channel = InMemoryProgressChannel::new();
        let snapshot = ProgressSnapshot::new(2, 4).with_phase("processing");
        assert!(channel.publish_progress("job-1", "PROGRESS", &snapshot).await);

        let payload = channel.get_last_progress("job-1").await.unwrap();
        assert_eq!(payload["progress"]["percent"], 50);
        assert_eq!(payload["progress"]["phase"], "processing");
    }

    #[tokio::test]
    async fn test_missing_job_returns_none() {
        let channel = InMemoryProgressChannel::new();
        assert!(channel.get_last_progress("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let channel = InMemoryProgressChannel::new();
        let mut subscriber = channel.subscribe("job-1").await;
        channel
            .publish_completion("job-1", "SUCCESS", Some(&serde_json::json!({"ok": 1})), None)
            .await;
        let payload = subscriber
            .next_message(StdDuration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(payload["status"], "SUCCESS");
        assert_eq!(payload["result"]["ok"], 1);
    }

    #[tokio::test]
    async fn test_cleanup_old() {
        let channel = InMemoryProgressChannel::new();
        channel
            .publish_progress("job-1", "PROGRESS", &ProgressSnapshot::new(1, 1))
            .await;
        // Nothing is old enough yet
        assert_eq!(channel.cleanup_old(1).await, 0);

        channel
            .storage
            .write()
            .await
            .get_mut("job-1")
            .unwrap()
            .1 = Utc::now() - Duration::hours(48);
        assert_eq!(channel.cleanup_old(24).await, 1);
        assert!(channel.get_last_progress("job-1").await.is_none());
    }
}
