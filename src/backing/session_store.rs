//! SQLite-backed implementation of `SessionStore` (C4, spec §4.6, §6.3).
//!
//! Writes to one session are serialized by a per-session mutex kept in a
//! `DashMap`, matching the "server queues writes to one session" ordering
//! guarantee from spec §5. Reads are not serialized against writes beyond
//! what SQLite itself provides.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::SessionStore;
use crate::domain::{Message, MessageRole};
use crate::error::{AppError, Result};

pub struct SqliteSessionStore {
    pool: SqlitePool,
    initialized: OnceCell<()>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SqliteSessionStore {
    pub async fn connect(sqlite_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(sqlite_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{sqlite_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        Ok(SqliteSessionStore { pool, initialized: OnceCell::new(), locks: DashMap::new() })
    }

    pub async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_messages (
                        session_id TEXT NOT NULL,
                        seq INTEGER NOT NULL,
                        role TEXT NOT NULL,
                        content TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        metadata_json TEXT NOT NULL,
                        PRIMARY KEY (session_id, seq)
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

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let next_seq: i64 = sqlx::query("SELECT COALESCE(MAX(seq), -1) + 1 FROM session_messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        sqlx::query(
            r#"
            INSERT INTO session_messages (session_id, seq, role, content, created_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(next_seq)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .bind(serde_json::to_string(&message.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content, created_at, metadata_json FROM session_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let role_str: String = row.try_get("role")?;
            let created_at: String = row.try_get("created_at")?;
            let metadata_json: String = row.try_get("metadata_json")?;
            messages.push(Message {
                role: role_str
                    .parse::<MessageRole>()
                    .map_err(|e| AppError::internal(format!("bad role in row: {e}")))?,
                content: row.try_get("content")?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| AppError::internal(format!("bad created_at: {e}")))?
                    .with_timezone(&chrono::Utc),
                metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            });
        }

        if let Some(limit) = limit {
            if messages.len() > limit {
                let start = messages.len() - limit;
                messages = messages.split_off(start);
            }
        }

        Ok(messages)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        sqlx::query("DELETE FROM session_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        self.locks.remove(session_id);
        Ok(())
    }
}
