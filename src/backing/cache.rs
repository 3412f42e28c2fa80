//! Redis-backed implementation of `Cache` (C1, spec §4.4).
//!
//! Every method maps transport/protocol errors into `CacheUnavailable`
//! (via `AppError::from<redis::RedisError>`) — callers are expected to
//! treat that variant as soft-fail, per spec §7.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use super::Cache;
use crate::error::Result;

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisCache { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }
}

/// Namespaced key helpers (spec §4.4).
///
/// The `search:` namespace from spec §4.4 is explicitly optional; this
/// crate does not cache merged retrieval results (see DESIGN.md), so no
/// helper for it is defined here.
pub fn embedding_key(sha256_hex: &str) -> String {
    format!("emb:{sha256_hex}")
}

pub fn expansion_key(sha256_hex: &str) -> String {
    format!("qexp:{sha256_hex}")
}
