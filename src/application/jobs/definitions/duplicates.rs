//! Duplicate detection job definition
//!
//! Computes perceptual hashes for unhashed images, then groups the
//! catalog into exact (checksum) and perceptual (Hamming-similarity)
//! duplicate groups in finalize.

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::Row;
use tracing::info;

use crate::domain::services::duplicates::{
    group_by_exact_match, group_by_similarity, select_primary_image, DuplicateGroup,
    ImageHashRecord,
};
use crate::domain::services::hashing::compute_all_hashes;
use crate::interfaces::jobs::{JobContext, JobDefinition, WorkItem};
use crate::shared::error::{JobError, RepositoryError};

/// Default Hamming distance threshold for perceptual similarity
const DEFAULT_SIMILARITY_THRESHOLD: u32 = 5;

/// Duplicate detection job
pub struct DetectDuplicatesJob;

impl DetectDuplicatesJob {
    /// Loads every hashed image of the catalog for grouping
    async fn load_hashed_images(
        ctx: &JobContext,
        catalog_id: &str,
    ) -> Result<Vec<ImageHashRecord>, JobError> {
        let rows = sqlx::query(
            r#"
            SELECT id, checksum, dhash, ahash, whash, quality_score, size_bytes
            FROM images
            WHERE catalog_id = ? AND dhash IS NOT NULL
            "#,
        )
        .bind(catalog_id)
        .fetch_all(&ctx.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut images = Vec::with_capacity(rows.len());
        for row in rows {
            images.push(ImageHashRecord {
                id: row.try_get("id").map_err(RepositoryError::from)?,
                checksum: row.try_get("checksum").map_err(RepositoryError::from)?,
                dhash: row.try_get("dhash").map_err(RepositoryError::from)?,
                ahash: row.try_get("ahash").map_err(RepositoryError::from)?,
                whash: row.try_get("whash").map_err(RepositoryError::from)?,
                quality_score: row.try_get("quality_score").map_err(RepositoryError::from)?,
                size_bytes: row.try_get("size_bytes").map_err(RepositoryError::from)?,
            });
        }
        Ok(images)
    }

    /// Replaces the catalog's duplicate groups in one transaction
    async fn save_groups(
        ctx: &JobContext,
        catalog_id: &str,
        groups: &[DuplicateGroup],
        images: &[ImageHashRecord],
    ) -> Result<(), JobError> {
        let mut tx = ctx.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query("DELETE FROM duplicate_groups WHERE catalog_id = ?")
            .bind(catalog_id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        for group in groups {
            let members: Vec<&ImageHashRecord> = images
                .iter()
                .filter(|img| group.image_ids.contains(&img.id))
                .collect();
            let member_records: Vec<ImageHashRecord> =
                members.into_iter().cloned().collect();
            let primary = select_primary_image(&member_records)
                .map_err(|e| JobError::Process(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO duplicate_groups (id, catalog_id, similarity_type, confidence,
                                              primary_image_id, image_ids)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(catalog_id)
            .bind(group.similarity_type.as_str())
            .bind(group.confidence as i64)
            .bind(primary)
            .bind(serde_json::to_string(&group.image_ids)?)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[async_trait]
impl JobDefinition for DetectDuplicatesJob {
    fn name(&self) -> &str {
        "detect_duplicates"
    }

    fn batch_size(&self) -> usize {
        1000
    }

    fn max_workers(&self) -> usize {
        4
    }

    /// Image ids still lacking a perceptual hash
    async fn discover(&self, ctx: &JobContext) -> Result<Vec<WorkItem>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let rows = sqlx::query(
            r#"
            SELECT id FROM images
            WHERE catalog_id = ? AND file_type = 'image' AND dhash IS NULL
            ORDER BY id
            "#,
        )
        .bind(catalog_id)
        .fetch_all(&ctx.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.iter()
            .map(|row| {
                Ok(json!(row
                    .try_get::<String, _>("id")
                    .map_err(RepositoryError::from)?))
            })
            .collect()
    }

    /// Computes the three perceptual hashes for one image
    async fn process(&self, ctx: &JobContext, item: &WorkItem) -> Result<Value, JobError> {
        let image_id = item
            .as_str()
            .ok_or_else(|| JobError::Process("duplicate item must be an image id".into()))?
            .to_string();

        let row = sqlx::query("SELECT source_path FROM images WHERE id = ?")
            .bind(&image_id)
            .fetch_optional(&ctx.pool)
            .await
            .map_err(RepositoryError::from)?;
        let Some(row) = row else {
            return Err(JobError::Process(format!("image {} not found", image_id)));
        };
        let path: String = row.try_get("source_path").map_err(RepositoryError::from)?;

        // Decode off the async runtime; image decoding is CPU-bound
        let hashes = tokio::task::spawn_blocking(move || {
            let decoded = image::open(&path)
                .map_err(|e| JobError::Process(format!("decode failed for {}: {}", path, e)))?;
            Ok::<_, JobError>(compute_all_hashes(&decoded.to_luma8()))
        })
        .await
        .map_err(|e| JobError::Process(format!("hash task aborted: {}", e)))??;

        sqlx::query("UPDATE images SET dhash = ?, ahash = ?, whash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(&hashes.dhash)
            .bind(&hashes.ahash)
            .bind(&hashes.whash)
            .bind(&image_id)
            .execute(&ctx.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(json!({
            "image_id": image_id,
            "dhash": hashes.dhash,
            "ahash": hashes.ahash,
            "whash": hashes.whash,
        }))
    }

    /// Groups the whole catalog once every batch has hashed its images
    async fn finalize(
        &self,
        ctx: &JobContext,
        _batch_results: &[Value],
    ) -> Result<Option<Value>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let threshold = ctx.param_u64(
            "similarity_threshold",
            DEFAULT_SIMILARITY_THRESHOLD as u64,
        ) as u32;

        let images = Self::load_hashed_images(ctx, catalog_id).await?;

        let exact_groups = group_by_exact_match(&images);
        let perceptual_groups =
            group_by_similarity(&images, |img| img.dhash.as_deref(), threshold)
                .map_err(|e| JobError::Process(e.to_string()))?;

        let all_groups: Vec<DuplicateGroup> = exact_groups
            .iter()
            .chain(perceptual_groups.iter())
            .cloned()
            .collect();
        Self::save_groups(ctx, catalog_id, &all_groups, &images).await?;

        let total_duplicates: usize = all_groups.iter().map(|g| g.image_ids.len()).sum();
        info!(
            "Catalog {}: {} exact groups, {} perceptual groups",
            catalog_id,
            exact_groups.len(),
            perceptual_groups.len()
        );

        Ok(Some(json!({
            "exact_groups": exact_groups.len(),
            "perceptual_groups": perceptual_groups.len(),
            "total_duplicates": total_duplicates,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::initialize_schema;
    use assert_matches::assert_matches;
    use sqlx::sqlite::SqlitePoolOptions;

    fn ctx(pool: sqlx::Pool<sqlx::Sqlite>, params: Value) -> JobContext {
        JobContext {
            pool,
            job_id: "job-1".into(),
            catalog_id: Some("cat-1".into()),
            params,
        }
    }

    async fn setup() -> sqlx::Pool<sqlx::Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    async fn insert_image(
        pool: &sqlx::Pool<sqlx::Sqlite>,
        id: &str,
        checksum: &str,
        dhash: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO images (id, catalog_id, source_path, file_type, checksum, dhash)
            VALUES (?, 'cat-1', ?, 'image', ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("/photos/{}.jpg", id))
        .bind(checksum)
        .bind(dhash)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_discover_returns_unhashed_images_only() {
        let pool = setup().await;
        insert_image(&pool, "a", "c1", None).await;
        insert_image(&pool, "b", "c2", Some("0000000000000000")).await;

        let items = DetectDuplicatesJob
            .discover(&ctx(pool, json!({})))
            .await
            .unwrap();
        assert_eq!(items, vec![json!("a")]);
    }

    #[tokio::test]
    async fn test_finalize_groups_and_persists() {
        let pool = setup().await;
        // Two byte-identical images, perceptually identical too
        insert_image(&pool, "a", "same", Some("0000000000000000")).await;
        insert_image(&pool, "b", "same", Some("0000000000000001")).await;
        // Unrelated image far away in hash space
        insert_image(&pool, "c", "other", Some("ffffffffffffffff")).await;

        let context = ctx(pool.clone(), json!({"similarity_threshold": 5}));
        let summary = DetectDuplicatesJob
            .finalize(&context, &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary["exact_groups"], 1);
        assert_eq!(summary["perceptual_groups"], 1);
        assert_eq!(summary["total_duplicates"], 4);

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM duplicate_groups WHERE catalog_id = 'cat-1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count.0, 2);

        // Finalize again: groups are replaced, not accumulated
        DetectDuplicatesJob.finalize(&context, &[]).await.unwrap();
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM duplicate_groups WHERE catalog_id = 'cat-1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_process_rejects_unknown_image() {
        let pool = setup().await;
        let err = DetectDuplicatesJob
            .process(&ctx(pool, json!({})), &json!("ghost"))
            .await
            .unwrap_err();
        assert_matches!(err, JobError::Process(_));
    }
}
