//! Contracts for the four backing services plus the two model services
//! (spec §6.3). These are narrow traits — the point of this module is the
//! interface, not the store's own search/indexing algorithm, which spec §1
//! explicitly places out of scope.

pub mod cache;
pub mod embedding;
pub mod llm;
pub mod metadata_store;
pub mod session_store;
pub mod vector_index;

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{File, Message, RetrievalHit};
use crate::error::Result;

/// Keyed small-value store with per-key TTLs (spec §4.4, §6.3).
///
/// Failures are soft everywhere they're called — see `CacheUnavailable` in
/// §7 — so callers should use `.ok()` / log-and-continue rather than `?`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// One row inserted into a vector partition: an embedding plus the chunk
/// metadata needed to reconstruct a `RetrievalHit` without a second fetch.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub chunk_index: usize,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

/// Per-document partitioned ANN index (spec §4.1 step 7, §6.3).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn create_partition(&self, partition: &str, dimension: usize) -> Result<()>;
    async fn insert(&self, partition: &str, rows: Vec<VectorRow>) -> Result<()>;
    async fn search(
        &self,
        partitions: &[String],
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>>;
    async fn drop_partition(&self, partition: &str) -> Result<()>;
}

/// Durable record of uploaded files and their chunks (spec §4.1, §6.3).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn file_exists(&self, file_id: &str) -> Result<bool>;
    async fn add_file(&self, file: &File) -> Result<()>;
    async fn get_file(&self, file_id: &str) -> Result<Option<File>>;
    async fn get_file_for_user(&self, file_id: &str, user_id: &str) -> Result<Option<File>>;
    async fn list_files(&self, user_id: &str) -> Result<Vec<File>>;
    async fn update_status(&self, file_id: &str, status: crate::domain::IndexingStatus) -> Result<()>;
    async fn add_chunks(&self, chunks: &[crate::domain::Chunk]) -> Result<()>;
    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

/// Append-only per-session chat log (spec §4.6, §6.3).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()>;
    async fn get_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Batched text→vector function, deterministic for identical input (spec §6.3).
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// One streamed token from a chat-completion call.
pub enum LlmToken {
    Delta(String),
    Done,
}

/// Streaming chat-completion (spec §4.6, §6.3).
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn chat_stream(
        &self,
        messages: Vec<crate::query::assembler::PromptMessage>,
        temperature: f32,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<LlmToken>>>;

    /// Non-streaming call used by the Query Expander (spec §4.2).
    async fn chat_once(
        &self,
        messages: Vec<crate::query::assembler::PromptMessage>,
        temperature: f32,
    ) -> Result<String>;
}
