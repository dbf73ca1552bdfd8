//! Database Schema Management
//!
//! Schema initialization for DarkroomD. The job engine owns `jobs`,
//! `job_batches`, and `job_progress`; the catalog tables are written only
//! through job process/finalize hooks.
//!
//! This is idempotent - safe to call multiple times.

use sqlx::{Pool, Sqlite};
use tracing::info;

/// Initialize all database tables
pub async fn initialize_schema(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    info!("Initializing database schema");

    // 1. Catalogs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalogs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            source_directories TEXT NOT NULL DEFAULT '[]',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 2. Images
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            catalog_id TEXT NOT NULL,
            source_path TEXT NOT NULL,
            file_type TEXT NOT NULL DEFAULT 'image',
            checksum TEXT,
            size_bytes INTEGER,
            capture_time DATETIME,
            camera_make TEXT,
            camera_model TEXT,
            gps_latitude REAL,
            gps_longitude REAL,
            quality_score REAL DEFAULT 0.0,
            dhash TEXT,
            ahash TEXT,
            whash TEXT,
            burst_id TEXT,
            burst_sequence INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(catalog_id, source_path)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 3. Jobs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            catalog_id TEXT,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            parameters TEXT NOT NULL DEFAULT '{}',
            progress TEXT NOT NULL DEFAULT '{}',
            result TEXT,
            error TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            completed_at DATETIME
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_catalog_created ON jobs(catalog_id, created_at DESC);",
    )
    .execute(pool)
    .await?;

    // 4. Job batches
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_batches (
            id TEXT PRIMARY KEY,
            parent_job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            catalog_id TEXT,
            job_type TEXT NOT NULL,
            batch_number INTEGER NOT NULL,
            total_batches INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            work_items TEXT NOT NULL DEFAULT '[]',
            items_count INTEGER NOT NULL DEFAULT 0,
            worker_id TEXT,
            processed_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            results TEXT,
            error_message TEXT,
            started_at DATETIME,
            completed_at DATETIME,
            updated_at DATETIME NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_batches_parent ON job_batches(parent_job_id);",
    )
    .execute(pool)
    .await?;

    // 5. Job progress snapshots (one row per job, GC'd by age)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_progress (
            job_id TEXT PRIMARY KEY,
            progress_data TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 6. Bursts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bursts (
            id TEXT PRIMARY KEY,
            catalog_id TEXT NOT NULL,
            image_count INTEGER NOT NULL,
            start_time DATETIME,
            end_time DATETIME,
            duration_seconds REAL,
            camera TEXT,
            best_image_id TEXT,
            selection_method TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 7. Duplicate groups
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_groups (
            id TEXT PRIMARY KEY,
            catalog_id TEXT NOT NULL,
            similarity_type TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            primary_image_id TEXT,
            image_ids TEXT NOT NULL DEFAULT '[]',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 8. Tags
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(catalog_id, name)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // 9. Image tags
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_tags (
            image_id TEXT NOT NULL,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            confidence REAL NOT NULL,
            source TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (image_id, tag_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(row.0, 1);
    }
}
