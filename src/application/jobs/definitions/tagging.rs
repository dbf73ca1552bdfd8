//! Auto-tagging job definition
//!
//! Tags catalog images with an inference backend. The backend is acquired
//! at batch start and released at batch end, including on failure; CLIP
//! runs true vectorised batches while Ollama scores item by item. Failed
//! batches feed the controller's auto-requeue threshold, and the
//! continuation resumes naturally because untagged-only discovery skips
//! everything already tagged.

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{Pool, Row, Sqlite};
use tracing::{info, warn};

use crate::infrastructure::external::tagging::{load_backend, InferenceBackend, TagPrediction};
use crate::interfaces::jobs::{BatchProcessOutcome, JobContext, JobDefinition, WorkItem};
use crate::shared::error::{JobError, RepositoryError};

const DEFAULT_BACKEND: &str = "clip";
const DEFAULT_THRESHOLD: f64 = 0.25;
const DEFAULT_MAX_TAGS: usize = 10;

/// Stores tags for one image, creating tag rows on first use
///
/// Returns the number of tags stored.
async fn store_image_tags(
    pool: &Pool<Sqlite>,
    catalog_id: &str,
    image_id: &str,
    tags: &[TagPrediction],
    source: &str,
) -> Result<u64, JobError> {
    let mut stored = 0u64;
    for tag in tags {
        let row = sqlx::query(
            r#"
            INSERT INTO tags (catalog_id, name)
            VALUES (?, ?)
            ON CONFLICT (catalog_id, name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(catalog_id)
        .bind(&tag.name)
        .fetch_one(pool)
        .await
        .map_err(RepositoryError::from)?;
        let tag_id: i64 = row.try_get("id").map_err(RepositoryError::from)?;

        sqlx::query(
            r#"
            INSERT INTO image_tags (image_id, tag_id, confidence, source)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (image_id, tag_id) DO UPDATE SET
                confidence = excluded.confidence,
                source = excluded.source
            "#,
        )
        .bind(image_id)
        .bind(tag_id)
        .bind(tag.confidence)
        .bind(source)
        .execute(pool)
        .await
        .map_err(RepositoryError::from)?;
        stored += 1;
    }
    Ok(stored)
}

/// Auto-tagging job
pub struct AutoTagJob;

impl AutoTagJob {
    fn backend_kind(ctx: &JobContext) -> String {
        ctx.param_str("backend", DEFAULT_BACKEND)
    }

    fn threshold(ctx: &JobContext) -> f64 {
        ctx.param_f64("threshold", DEFAULT_THRESHOLD)
    }

    fn max_tags(ctx: &JobContext) -> usize {
        ctx.param_u64("max_tags", DEFAULT_MAX_TAGS as u64) as usize
    }

    fn item_fields(item: &WorkItem) -> Result<(String, String), JobError> {
        let image_id = item
            .get("image_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobError::Process("tag item missing image_id".into()))?;
        let source_path = item
            .get("source_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobError::Process("tag item missing source_path".into()))?;
        Ok((image_id.to_string(), source_path.to_string()))
    }

    /// Vectorised path: one inference call for the whole batch
    async fn tag_vectorised(
        ctx: &JobContext,
        backend: &dyn InferenceBackend,
        items: &[WorkItem],
    ) -> Result<BatchProcessOutcome, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let mut outcome = BatchProcessOutcome::default();

        let mut ids_and_paths = Vec::with_capacity(items.len());
        for item in items {
            ids_and_paths.push(Self::item_fields(item)?);
        }
        let paths: Vec<String> = ids_and_paths.iter().map(|(_, p)| p.clone()).collect();

        let predictions = backend
            .tag_batch(&paths, Self::threshold(ctx), Self::max_tags(ctx))
            .await
            .map_err(|e| JobError::Process(e.to_string()))?;

        for (image_id, path) in &ids_and_paths {
            let tags = predictions.get(path).cloned().unwrap_or_default();
            let stored = if tags.is_empty() {
                0
            } else {
                store_image_tags(&ctx.pool, catalog_id, image_id, &tags, backend.name()).await?
            };
            if stored > 0 {
                outcome.success_count += 1;
                outcome.results.push(json!({
                    "image_id": image_id,
                    "tags_added": stored,
                }));
            }
            outcome.processed_count += 1;
        }
        Ok(outcome)
    }

    /// Item-by-item path for backends without batch inference
    async fn tag_individually(
        ctx: &JobContext,
        backend: &dyn InferenceBackend,
        items: &[WorkItem],
    ) -> Result<BatchProcessOutcome, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let mut outcome = BatchProcessOutcome::default();

        for item in items {
            let (image_id, path) = Self::item_fields(item)?;
            match backend
                .tag_image(&path, Self::threshold(ctx), Self::max_tags(ctx))
                .await
            {
                Ok(tags) => {
                    let stored = if tags.is_empty() {
                        0
                    } else {
                        store_image_tags(&ctx.pool, catalog_id, &image_id, &tags, backend.name())
                            .await?
                    };
                    if stored > 0 {
                        outcome.success_count += 1;
                        outcome.results.push(json!({
                            "image_id": image_id,
                            "tags_added": stored,
                        }));
                    }
                    outcome.processed_count += 1;
                }
                Err(e) => {
                    warn!("Tagging failed for image {}: {}", image_id, e);
                    outcome
                        .errors
                        .push(json!({ "item": item, "error": e.to_string() }));
                    outcome.error_count += 1;
                    outcome.processed_count += 1;
                }
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl JobDefinition for AutoTagJob {
    fn name(&self) -> &str {
        "auto_tag"
    }

    fn batch_size(&self) -> usize {
        500
    }

    /// GPU-bound: one model load at a time
    fn max_workers(&self) -> usize {
        1
    }

    fn supports_batch_processing(&self) -> bool {
        true
    }

    fn dispatch_status(&self) -> &'static str {
        "STARTED"
    }

    /// Images to tag: untagged only (the default, which also makes a
    /// requeued continuation resume where the failed run stopped) or all
    async fn discover(&self, ctx: &JobContext) -> Result<Vec<WorkItem>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let tag_mode = ctx.param_str("tag_mode", "untagged_only");

        let rows = if tag_mode == "all" {
            sqlx::query(
                r#"
                SELECT id, source_path FROM images
                WHERE catalog_id = ? AND file_type = 'image'
                ORDER BY id
                "#,
            )
            .bind(catalog_id)
            .fetch_all(&ctx.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT i.id, i.source_path FROM images i
                WHERE i.catalog_id = ? AND i.file_type = 'image'
                AND NOT EXISTS (SELECT 1 FROM image_tags it WHERE it.image_id = i.id)
                ORDER BY i.id
                "#,
            )
            .bind(catalog_id)
            .fetch_all(&ctx.pool)
            .await
        }
        .map_err(RepositoryError::from)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(RepositoryError::from)?;
            let path: String = row.try_get("source_path").map_err(RepositoryError::from)?;
            items.push(json!({ "image_id": id, "source_path": path }));
        }
        info!(
            "Found {} images for tagging (mode={})",
            items.len(),
            tag_mode
        );
        Ok(items)
    }

    async fn process(&self, ctx: &JobContext, item: &WorkItem) -> Result<Value, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let (image_id, path) = Self::item_fields(item)?;

        let backend = load_backend(
            &Self::backend_kind(ctx),
            ctx.params.get("model").and_then(|m| m.as_str()).map(String::from),
        )
        .map_err(|e| JobError::Process(e.to_string()))?;

        let tagged = backend
            .tag_image(&path, Self::threshold(ctx), Self::max_tags(ctx))
            .await
            .map_err(|e| JobError::Process(e.to_string()));
        let result = match tagged {
            Ok(tags) => {
                let stored =
                    store_image_tags(&ctx.pool, catalog_id, &image_id, &tags, backend.name())
                        .await?;
                Ok(json!({ "image_id": image_id, "tags_added": stored }))
            }
            Err(e) => Err(e),
        };
        backend.cleanup().await;
        result
    }

    /// One backend acquisition per batch, released even on failure
    async fn process_batch(
        &self,
        ctx: &JobContext,
        items: &[WorkItem],
    ) -> Result<BatchProcessOutcome, JobError> {
        let backend = load_backend(
            &Self::backend_kind(ctx),
            ctx.params.get("model").and_then(|m| m.as_str()).map(String::from),
        )
        .map_err(|e| JobError::Process(e.to_string()))?;

        let outcome = if backend.supports_batch() {
            Self::tag_vectorised(ctx, backend.as_ref(), items).await
        } else {
            Self::tag_individually(ctx, backend.as_ref(), items).await
        };

        backend.cleanup().await;
        outcome
    }

    /// Sums stored-tag counters; batch failures are the controller's
    /// concern (auto-requeue threshold)
    async fn finalize(
        &self,
        _ctx: &JobContext,
        batch_results: &[Value],
    ) -> Result<Option<Value>, JobError> {
        let images_tagged = batch_results.len();
        let tags_added: i64 = batch_results
            .iter()
            .filter_map(|r| r.get("tags_added").and_then(|v| v.as_i64()))
            .sum();
        Ok(Some(json!({
            "images_tagged": images_tagged,
            "tags_added": tags_added,
        })))
    }
}
