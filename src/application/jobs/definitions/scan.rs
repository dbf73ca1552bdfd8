//! Scan job definition
//!
//! Discovers media files under the catalog's source directories and
//! ingests them: content digest, size, type classification, and the
//! metadata block for downstream jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::interfaces::jobs::{JobContext, JobDefinition, WorkItem};
use crate::shared::error::JobError;

/// Image file extensions supported for scanning
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "heif", "webp", "bmp", "tiff", "tif",
];

/// RAW formats, classified as images
const RAW_EXTENSIONS: &[&str] = &["raw", "cr2", "cr3", "nef", "arw", "dng", "orf", "rw2"];

/// Video file extensions
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "m4v", "wmv", "webm"];

/// Whether a path carries a supported media extension
fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
        || RAW_EXTENSIONS.contains(&ext.as_str())
        || VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Classifies a path as "image" or "video"
fn classify(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        "video"
    } else {
        "image"
    }
}

/// Streaming SHA-256 of a file's content
async fn compute_checksum(path: &Path) -> Result<String, JobError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| JobError::Process(format!("cannot open {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| JobError::Process(format!("read failed for {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Scan job: walk source directories, digest and ingest every media file
pub struct ScanJob;

impl ScanJob {
    /// Source directories configured for the catalog (JSON array column)
    async fn source_directories(ctx: &JobContext, catalog_id: &str) -> Result<Vec<String>, JobError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT source_directories FROM catalogs WHERE id = ?")
                .bind(catalog_id)
                .fetch_optional(&ctx.pool)
                .await
                .map_err(crate::shared::error::RepositoryError::from)?;
        match row {
            Some((raw,)) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl JobDefinition for ScanJob {
    fn name(&self) -> &str {
        "scan"
    }

    fn batch_size(&self) -> usize {
        500
    }

    fn max_workers(&self) -> usize {
        4
    }

    async fn discover(&self, ctx: &JobContext) -> Result<Vec<WorkItem>, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let source_dirs = Self::source_directories(ctx, catalog_id).await?;

        let mut files = Vec::new();
        for dir in &source_dirs {
            let root = Path::new(dir);
            if !root.is_dir() {
                debug!("Skipping missing source directory {}", dir);
                continue;
            }
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() && is_media_file(entry.path()) {
                    files.push(json!(entry.path().to_string_lossy()));
                }
            }
        }
        // Stable discovery order keeps batches reproducible across runs
        files.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        Ok(files)
    }

    async fn process(&self, ctx: &JobContext, item: &WorkItem) -> Result<Value, JobError> {
        let catalog_id = ctx.require_catalog()?;
        let path_str = item
            .as_str()
            .ok_or_else(|| JobError::Process("scan item must be a file path".into()))?;
        let path = Path::new(path_str);

        let checksum = compute_checksum(path).await?;
        let stat = tokio::fs::metadata(path)
            .await
            .map_err(|e| JobError::Process(format!("stat failed for {}: {}", path_str, e)))?;
        let size_bytes = stat.len() as i64;
        let file_type = classify(path);

        let extract_metadata = ctx
            .params
            .get("extract_metadata")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        // Capture time falls back to the filesystem modification time;
        // EXIF fields stay null until an extractor fills them in.
        let capture_time: Option<DateTime<Utc>> = if extract_metadata {
            stat.modified().ok().map(DateTime::<Utc>::from)
        } else {
            None
        };

        let image_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO images (id, catalog_id, source_path, file_type, checksum,
                                size_bytes, capture_time, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (catalog_id, source_path) DO UPDATE SET
                file_type = excluded.file_type,
                checksum = excluded.checksum,
                size_bytes = excluded.size_bytes,
                capture_time = COALESCE(images.capture_time, excluded.capture_time),
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&image_id)
        .bind(catalog_id)
        .bind(path_str)
        .bind(file_type)
        .bind(&checksum)
        .bind(size_bytes)
        .bind(capture_time)
        .execute(&ctx.pool)
        .await
        .map_err(crate::shared::error::RepositoryError::from)?;

        let mut result = json!({
            "path": path_str,
            "checksum": checksum,
            "size_bytes": size_bytes,
            "file_type": file_type,
        });
        if extract_metadata {
            result["metadata"] = json!({
                "capture_time": capture_time,
                "camera_make": Value::Null,
                "camera_model": Value::Null,
                "gps_latitude": Value::Null,
                "gps_longitude": Value::Null,
            });
        }
        Ok(result)
    }

    async fn finalize(
        &self,
        _ctx: &JobContext,
        batch_results: &[Value],
    ) -> Result<Option<Value>, JobError> {
        let total_size: i64 = batch_results
            .iter()
            .filter_map(|r| r.get("size_bytes").and_then(|v| v.as_i64()))
            .sum();
        let images = batch_results
            .iter()
            .filter(|r| r.get("file_type").and_then(|v| v.as_str()) == Some("image"))
            .count();
        let videos = batch_results
            .iter()
            .filter(|r| r.get("file_type").and_then(|v| v.as_str()) == Some("video"))
            .count();

        Ok(Some(json!({
            "total_files": batch_results.len(),
            "total_images": images,
            "total_videos": videos,
            "total_size_bytes": total_size,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::initialize_schema;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::Write;

    fn ctx(pool: sqlx::Pool<sqlx::Sqlite>, catalog_id: &str) -> JobContext {
        JobContext {
            pool,
            job_id: "job-1".into(),
            catalog_id: Some(catalog_id.into()),
            params: json!({}),
        }
    }

    async fn setup(catalog_id: &str, dirs: &[&str]) -> sqlx::Pool<sqlx::Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        sqlx::query("INSERT INTO catalogs (id, name, source_directories) VALUES (?, ?, ?)")
            .bind(catalog_id)
            .bind("test")
            .bind(serde_json::to_string(dirs).unwrap())
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[test]
    fn test_media_classification() {
        assert!(is_media_file(Path::new("/p/a.JPG")));
        assert!(is_media_file(Path::new("/p/a.cr2")));
        assert!(is_media_file(Path::new("/p/a.mp4")));
        assert!(!is_media_file(Path::new("/p/a.txt")));
        assert!(!is_media_file(Path::new("/p/noext")));

        assert_eq!(classify(Path::new("/p/a.mov")), "video");
        assert_eq!(classify(Path::new("/p/a.nef")), "image");
        assert_eq!(classify(Path::new("/p/a.png")), "image");
    }

    #[tokio::test]
    async fn test_discover_finds_media_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.mp4", "notes.txt"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(b"data").unwrap();
        }
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        std::fs::File::create(sub.join("c.png")).unwrap();

        let pool = setup("cat-1", &[dir.path().to_str().unwrap()]).await;
        let items = ScanJob.discover(&ctx(pool, "cat-1")).await.unwrap();
        assert_eq!(items.len(), 3); // a.jpg, b.mp4, nested/c.png
    }

    #[tokio::test]
    async fn test_discover_empty_for_missing_dirs() {
        let pool = setup("cat-1", &["/does/not/exist"]).await;
        let items = ScanJob.discover(&ctx(pool, "cat-1")).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_process_digests_and_ingests() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("photo.jpg");
        std::fs::write(&file_path, b"hello world").unwrap();

        let pool = setup("cat-1", &[]).await;
        let context = ctx(pool.clone(), "cat-1");
        let item = json!(file_path.to_str().unwrap());

        let result = ScanJob.process(&context, &item).await.unwrap();
        // SHA-256 of "hello world"
        assert_eq!(
            result["checksum"],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(result["size_bytes"], 11);
        assert_eq!(result["file_type"], "image");
        assert!(result["metadata"]["capture_time"].is_string());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images WHERE catalog_id = 'cat-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        // Re-processing the same file upserts, not duplicates
        ScanJob.process(&context, &item).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images WHERE catalog_id = 'cat-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_finalize_aggregates_counters() {
        let pool = setup("cat-1", &[]).await;
        let results = vec![
            json!({"file_type": "image", "size_bytes": 100}),
            json!({"file_type": "image", "size_bytes": 50}),
            json!({"file_type": "video", "size_bytes": 1000}),
        ];
        let summary = ScanJob
            .finalize(&ctx(pool, "cat-1"), &results)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary["total_files"], 3);
        assert_eq!(summary["total_images"], 2);
        assert_eq!(summary["total_videos"], 1);
        assert_eq!(summary["total_size_bytes"], 1150);
    }

    #[tokio::test]
    async fn test_finalize_zeroes_on_empty() {
        let pool = setup("cat-1", &[]).await;
        let summary = ScanJob
            .finalize(&ctx(pool, "cat-1"), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary["total_files"], 0);
        assert_eq!(summary["total_images"], 0);
        assert_eq!(summary["total_videos"], 0);
        assert_eq!(summary["total_size_bytes"], 0);
    }
}
