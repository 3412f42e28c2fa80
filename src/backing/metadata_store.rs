//! SQLite-backed implementation of `MetadataStore` (C3, spec §4.1, §6.3).
//!
//! The pool (the handle) and the schema migration (the backing resource)
//! are deliberately two different things — constructing `SqliteMetadataStore`
//! only opens the pool; `ensure_initialized` runs `CREATE TABLE IF NOT EXISTS`
//! exactly once per process via a `OnceCell` latch, separate from handle
//! construction (spec §5 design notes: conflating the two is the root cause
//! of double-initialization bugs).

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tokio::sync::OnceCell;

use super::MetadataStore;
use crate::domain::{Chunk, File, FileType, IndexingStatus};
use crate::error::{AppError, Result};

pub struct SqliteMetadataStore {
    pool: SqlitePool,
    initialized: OnceCell<()>,
}

impl SqliteMetadataStore {
    pub async fn connect(sqlite_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(sqlite_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{sqlite_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        Ok(SqliteMetadataStore { pool, initialized: OnceCell::new() })
    }

    /// Idempotent, safe to call from multiple tasks; only the first caller
    /// actually runs the DDL.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS files (
                        file_id TEXT PRIMARY KEY,
                        original_name TEXT NOT NULL,
                        file_type TEXT NOT NULL,
                        byte_size INTEGER NOT NULL,
                        uploaded_at TEXT NOT NULL,
                        user_id TEXT NOT NULL,
                        chunk_count INTEGER NOT NULL,
                        status TEXT NOT NULL,
                        metadata_json TEXT NOT NULL
                    )
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_id)")
                    .execute(&self.pool)
                    .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chunks (
                        file_id TEXT NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        level TEXT NOT NULL,
                        content TEXT NOT NULL,
                        char_start INTEGER NOT NULL,
                        char_end INTEGER NOT NULL,
                        content_hash TEXT NOT NULL,
                        word_count INTEGER NOT NULL,
                        position_ratio REAL NOT NULL,
                        PRIMARY KEY (file_id, chunk_index)
                    )
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), AppError>(())
            })
            .await?;
        Ok(())
    }
}

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> Result<File> {
    let file_type_str: String = row.try_get("file_type")?;
    let status_str: String = row.try_get("status")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let uploaded_at: String = row.try_get("uploaded_at")?;

    Ok(File {
        file_id: row.try_get("file_id")?,
        original_name: row.try_get("original_name")?,
        file_type: FileType::from_extension(&file_type_str)
            .ok_or_else(|| AppError::internal(format!("unknown file_type in row: {file_type_str}")))?,
        byte_size: row.try_get::<i64, _>("byte_size")? as u64,
        uploaded_at: chrono::DateTime::parse_from_rfc3339(&uploaded_at)
            .map_err(|e| AppError::internal(format!("bad uploaded_at: {e}")))?
            .with_timezone(&chrono::Utc),
        user_id: row.try_get("user_id")?,
        chunk_count: row.try_get::<i64, _>("chunk_count")? as usize,
        status: status_str
            .parse()
            .map_err(|e| AppError::internal(format!("bad status in row: {e}")))?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn file_exists(&self, file_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn add_file(&self, file: &File) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (file_id, original_name, file_type, byte_size, uploaded_at, user_id, chunk_count, status, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.file_id)
        .bind(&file.original_name)
        .bind(file.file_type.as_str())
        .bind(file.byte_size as i64)
        .bind(file.uploaded_at.to_rfc3339())
        .bind(&file.user_id)
        .bind(file.chunk_count as i64)
        .bind(file.status.as_str())
        .bind(serde_json::to_string(&file.metadata)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<Option<File>> {
        let row = sqlx::query("SELECT * FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_file).transpose()
    }

    async fn get_file_for_user(&self, file_id: &str, user_id: &str) -> Result<Option<File>> {
        let row = sqlx::query("SELECT * FROM files WHERE file_id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_file).transpose()
    }

    async fn list_files(&self, user_id: &str) -> Result<Vec<File>> {
        let rows = sqlx::query("SELECT * FROM files WHERE user_id = ? ORDER BY uploaded_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_file).collect()
    }

    async fn update_status(&self, file_id: &str, status: IndexingStatus) -> Result<()> {
        sqlx::query("UPDATE files SET status = ? WHERE file_id = ?")
            .bind(status.as_str())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (file_id, chunk_index, level, content, char_start, char_end, content_hash, word_count, position_ratio)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.file_id)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.level.as_str())
            .bind(&chunk.content)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(&chunk.content_hash)
            .bind(chunk.word_count as i64)
            .bind(chunk.position_ratio)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ?").bind(file_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM files WHERE file_id = ?").bind(file_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
