//! Database operations for Presscast
//!
//! Two tables: `publish_log`, a capped ring of the most recent publish
//! attempts, and `publish_status`, the latest outcome per post (what the
//! retry path consults).

use sqlx::sqlite::SqlitePool;
use std::path::Path;

use crate::error::Result;
use crate::types::{LogRecord, PublishStatus};

/// Oldest entries beyond this count are dropped on every append
pub const LOG_CAPACITY: i64 = 100;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // and mode=rwc so the file is created on first run
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(crate::error::DbError::SqlxError)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;
        Ok(Self { pool })
    }

    /// Append a log record and enforce the ring capacity in the same call.
    pub async fn append_log(&self, record: &LogRecord) -> Result<()> {
        let success = if record.success { 1 } else { 0 };

        sqlx::query(
            r#"
            INSERT INTO publish_log (post_id, timestamp, message, image_path, success, response_text, remote_post_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.post_id)
        .bind(record.timestamp)
        .bind(&record.message)
        .bind(&record.image_path)
        .bind(success)
        .bind(&record.response_text)
        .bind(&record.remote_post_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        // Keep only the newest LOG_CAPACITY entries
        sqlx::query(
            r#"
            DELETE FROM publish_log
            WHERE id NOT IN (
                SELECT id FROM publish_log
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(LOG_CAPACITY)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Most recent log records, newest first.
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<LogRecord>> {
        use sqlx::Row;

        let rows = sqlx::query(
            r#"
            SELECT id, post_id, timestamp, message, image_path, success, response_text, remote_post_id
            FROM publish_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| LogRecord {
                id: r.get("id"),
                post_id: r.get("post_id"),
                timestamp: r.get("timestamp"),
                message: r.get("message"),
                image_path: r.get("image_path"),
                success: r.get::<i32, _>("success") != 0,
                response_text: r.get("response_text"),
                remote_post_id: r.get("remote_post_id"),
            })
            .collect())
    }

    /// Record the latest outcome for a post, replacing any earlier one.
    pub async fn set_status(
        &self,
        post_id: &str,
        status: PublishStatus,
        remote_post_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO publish_status (post_id, status, remote_post_id, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(post_id)
        .bind(status.as_str())
        .bind(remote_post_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Latest recorded outcome for a post, if any.
    pub async fn get_status(&self, post_id: &str) -> Result<Option<PublishStatus>> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT status FROM publish_status WHERE post_id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.and_then(|r| PublishStatus::from_str(&r.get::<String, _>("status"))))
    }
}
