//! Database-backed Progress Channel
//!
//! Persists the latest progress payload per job in the `job_progress`
//! table (for REST polling) and fans the same payload out through the
//! in-process notification hub (for subscribers). The row is written
//! first; a notification is only emitted for a successfully stored
//! payload, so snapshot and notification always agree.
//!
//! Publishing never fails the caller: storage errors are logged and
//! swallowed.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{Pool, Row, Sqlite};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::value_objects::ProgressSnapshot;
use crate::infrastructure::messaging::notification_hub::NotificationHub;
use crate::infrastructure::messaging::subscriber::BroadcastSubscriber;
use crate::interfaces::messaging::{
    build_completion_payload, build_progress_payload, progress_channel_name, ProgressChannel,
    ProgressSubscriber,
};

/// Progress channel backed by the `job_progress` table
pub struct DatabaseProgressChannel {
    pool: Pool<Sqlite>,
    hub: Arc<NotificationHub>,
}

impl DatabaseProgressChannel {
    /// Creates a new database progress channel
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            hub: Arc::new(NotificationHub::new()),
        }
    }

    async fn store_and_notify(&self, job_id: &str, payload: Value) -> bool {
        let serialized = match serde_json::to_string(&payload) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize progress for job {}: {}", job_id, e);
                return false;
            }
        };

        let stored = sqlx::query(
            r#"
            INSERT INTO job_progress (job_id, progress_data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (job_id) DO UPDATE SET progress_data = excluded.progress_data,
                                               updated_at = excluded.updated_at
            "#,
        )
        .bind(job_id)
        .bind(&serialized)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match stored {
            Ok(_) => {
                self.hub.notify(&progress_channel_name(job_id), payload);
                true
            }
            Err(e) => {
                warn!("Failed to publish progress for job {}: {}", job_id, e);
                false
            }
        }
    }
}

#[async_trait]
impl ProgressChannel for DatabaseProgressChannel {
    async fn publish_progress(
        &self,
        job_id: &str,
        state: &str,
        snapshot: &ProgressSnapshot,
    ) -> bool {
        let payload = build_progress_payload(job_id, state, snapshot);
        let ok = self.store_and_notify(job_id, payload).await;
        if ok {
            debug!(
                "Published progress for job {}: {} {}/{}",
                job_id, state, snapshot.current, snapshot.total
            );
        }
        ok
    }

    async fn publish_completion(
        &self,
        job_id: &str,
        state: &str,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> bool {
        let payload = build_completion_payload(job_id, state, result, error);
        let ok = self.store_and_notify(job_id, payload).await;
        if ok {
            debug!("Published completion for job {}: {}", job_id, state);
        }
        ok
    }

    async fn get_last_progress(&self, job_id: &str) -> Option<Value> {
        let row = sqlx::query("SELECT progress_data FROM job_progress WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(Some(row)) => {
                let data: String = row.try_get("progress_data").ok()?;
                serde_json::from_str(&data).ok()
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to get progress for job {}: {}", job_id, e);
                None
            }
        }
    }

    async fn subscribe(&self, job_id: &str) -> Box<dyn ProgressSubscriber> {
        let receiver = self.hub.subscribe(&progress_channel_name(job_id));
        Box::new(BroadcastSubscriber::new(receiver))
    }

    async fn cleanup_old(&self, max_age_hours: i64) -> u64 {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        match sqlx::query("DELETE FROM job_progress WHERE updated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(result) => {
                let cleaned = result.rows_affected();
                if cleaned > 0 {
                    debug!("Cleaned up {} old progress records", cleaned);
                }
                cleaned
            }
            Err(e) => {
                warn!("Failed to cleanup old progress data: {}", e);
                0
            }
        }
    }
}
