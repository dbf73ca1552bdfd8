//! Burst detection job definition
//!
//! Single-pass over the catalog's time-sorted images. Batching exists for
//! restart tracking: each worker runs the detector over its contiguous
//! time slice, and finalize re-checks slice boundaries with the same
//! gap/camera rule before persisting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::Row;
use tracing::info;

use crate::domain::services::bursts::{
    detect_bursts, merge_adjacent_bursts, select_best_in_burst, BestSelection, Burst, BurstImage,
};
use crate::interfaces::jobs::{BatchProcessOutcome, JobContext, JobDefinition, WorkItem};
use crate::shared::error::{JobError, RepositoryError};

/// Default maximum seconds between consecutive captures in a burst
const DEFAULT_GAP_THRESHOLD: f64 = 2.0;

/// Default minimum images to form a burst
const DEFAULT_MIN_BURST_SIZE: usize = 3;

/// Burst detection job
pub struct DetectBurstsJob;

impl DetectBurstsJob {
    fn gap_threshold(ctx: &JobContext) -> f64 {
        ctx.param_f64("gap_threshold", DEFAULT_GAP_THRESHOLD)
    }

    fn min_burst_size(ctx: &JobContext) -> usize {
        ctx.param_u64("min_burst_size", DEFAULT_MIN_BURST_SIZE as u64) as usize
    }

    fn parse_images(items: &[WorkItem]) -> Vec<BurstImage> {
        items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?.to_string();
                let timestamp = item
                    .get("timestamp")?
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
                    .with_timezone(&Utc);
                Some(BurstImage {
                    id,
                    timestamp,
                    camera: item.get("camera").and_then(|c| c.as_str()).map(String::from),
                    quality_score: item
                        .get("quality_score")
                        .and_then(|q| q.as_f64())
                        .unwrap_or(0.0),
                })
            })
            .collect()
    }

    fn burst_to_value(burst: &Burst) -> Value {
        json!({
            "image_ids": burst.image_ids,
            "start_time": burst.start_time.to_rfc3339(),
            "end_time": burst.end_time.to_rfc3339(),
            "duration_seconds": burst.duration_seconds,
            "camera": burst.camera,
            "best_image_id": burst.best_image_id,
        })
    }

    fn value_to_burst(value: &Value) -> Option<Burst> {
        let parse_ts = |key: &str| {
            value
                .get(key)?
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        let start_time = parse_ts("start_time")?;
        let end_time = parse_ts("end_time")?;
        Some(Burst {
            image_ids: value
                .get("image_ids")?
                .as_array()?
                .iter()
                .filter_map(|id| id.as_str().map(String::from))
                .collect(),
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
            camera: value.get("camera").and_then(|c| c.as_str()).map(String::from),
            best_image_id: value
                .get("best_image_id")
                .and_then(|b| b.as_str())
                .map(String::from),
        })
    }
}

#[async_trait]
impl JobDefinition for DetectBurstsJob {
    fn name(&self) -> &str {
        "detect_bursts"
    }

    /// Large time slices; batches exist for restartability, not throughput
    fn batch_size(&self) -> usize {
        5000
    }

    fn max_workers(&self) -> usize {
        4
    }

    fn supports_batch_processing(&self) -> bool {
        true
    }

    /// Images with a reliable capture time, sorted so batch slices are
    /// contiguous time windows
    async fn discover(&self, ctx: &JobContext) -> Result<Vec<WorkItem>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let rows = sqlx::query(
            r#"
            SELECT id, capture_time, camera_make, camera_model, quality_score
            FROM images
            WHERE catalog_id = ? AND file_type = 'image' AND capture_time IS NOT NULL
            ORDER BY capture_time
            "#,
        )
        .bind(catalog_id)
        .fetch_all(&ctx.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(RepositoryError::from)?;
            let capture_time: DateTime<Utc> =
                row.try_get("capture_time").map_err(RepositoryError::from)?;
            let make: Option<String> =
                row.try_get("camera_make").map_err(RepositoryError::from)?;
            let model: Option<String> =
                row.try_get("camera_model").map_err(RepositoryError::from)?;
            let quality: Option<f64> =
                row.try_get("quality_score").map_err(RepositoryError::from)?;

            let camera = match (make, model) {
                (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
                (Some(make), None) => Some(make),
                (None, Some(model)) => Some(model),
                (None, None) => None,
            };
            items.push(json!({
                "id": id,
                "timestamp": capture_time.to_rfc3339(),
                "camera": camera,
                "quality_score": quality.unwrap_or(0.0),
            }));
        }
        Ok(items)
    }

    async fn process(&self, _ctx: &JobContext, _item: &WorkItem) -> Result<Value, JobError> {
        Err(JobError::Process(
            "detect_bursts runs whole batches, not single items".into(),
        ))
    }

    /// Runs the detector over one time slice
    async fn process_batch(
        &self,
        ctx: &JobContext,
        items: &[WorkItem],
    ) -> Result<BatchProcessOutcome, JobError> {
        let images = Self::parse_images(items);
        let mut bursts = detect_bursts(&images, Self::gap_threshold(ctx), Self::min_burst_size(ctx));

        for burst in &mut bursts {
            let members: Vec<BurstImage> = images
                .iter()
                .filter(|img| burst.image_ids.contains(&img.id))
                .cloned()
                .collect();
            burst.best_image_id =
                select_best_in_burst(&members, BestSelection::Quality).ok();
        }

        Ok(BatchProcessOutcome {
            processed_count: images.len() as i64,
            success_count: bursts.len() as i64,
            error_count: 0,
            results: bursts.iter().map(Self::burst_to_value).collect(),
            errors: Vec::new(),
        })
    }

    /// Merges slice-boundary bursts and replaces the catalog's burst rows
    async fn finalize(
        &self,
        ctx: &JobContext,
        batch_results: &[Value],
    ) -> Result<Option<Value>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let slice_bursts: Vec<Burst> = batch_results
            .iter()
            .filter_map(Self::value_to_burst)
            .collect();

        // Batch results arrive in batch order, which is time order here;
        // re-check adjacent endpoints with the same gap/camera rule.
        let merged = merge_adjacent_bursts(
            slice_bursts,
            Self::gap_threshold(ctx),
            Self::min_burst_size(ctx),
        );

        let mut tx = ctx.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            "UPDATE images SET burst_id = NULL, burst_sequence = NULL WHERE catalog_id = ?",
        )
        .bind(catalog_id)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;
        sqlx::query("DELETE FROM bursts WHERE catalog_id = ?")
            .bind(catalog_id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        let mut total_burst_images = 0usize;
        for burst in &merged {
            let burst_id = uuid::Uuid::new_v4().to_string();
            total_burst_images += burst.image_ids.len();

            sqlx::query(
                r#"
                INSERT INTO bursts (id, catalog_id, image_count, start_time, end_time,
                                    duration_seconds, camera, best_image_id, selection_method)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&burst_id)
            .bind(catalog_id)
            .bind(burst.image_ids.len() as i64)
            .bind(burst.start_time)
            .bind(burst.end_time)
            .bind(burst.duration_seconds)
            .bind(&burst.camera)
            .bind(&burst.best_image_id)
            .bind(BestSelection::Quality.as_str())
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            for (sequence, image_id) in burst.image_ids.iter().enumerate() {
                sqlx::query("UPDATE images SET burst_id = ?, burst_sequence = ? WHERE id = ?")
                    .bind(&burst_id)
                    .bind(sequence as i64)
                    .bind(image_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(RepositoryError::from)?;
            }
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            "Catalog {}: {} bursts covering {} images",
            catalog_id,
            merged.len(),
            total_burst_images
        );
        Ok(Some(json!({
            "bursts_detected": merged.len(),
            "total_burst_images": total_burst_images,
        })))
    }
}
