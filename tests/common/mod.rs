//! In-memory fakes for the four backing-service traits, shared by the
//! integration tests. None of these touch a network socket or the
//! filesystem, so the pipeline/orchestrator tests run hermetically.

use async_trait::async_trait;
use docrag::backing::{Cache, EmbeddingService, LlmService, LlmToken, MetadataStore, SessionStore, VectorIndex, VectorRow};
use docrag::domain::{Chunk, File, IndexingStatus, Message, RetrievalHit};
use docrag::error::Result;
use docrag::query::assembler::PromptMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct InMemoryCache {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }
    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<()> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.lock().unwrap().contains_key(key))
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    files: Mutex<HashMap<String, File>>,
    chunks: Mutex<Vec<Chunk>>,
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn file_exists(&self, file_id: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(file_id))
    }
    async fn add_file(&self, file: &File) -> Result<()> {
        self.files.lock().unwrap().insert(file.file_id.clone(), file.clone());
        Ok(())
    }
    async fn get_file(&self, file_id: &str) -> Result<Option<File>> {
        Ok(self.files.lock().unwrap().get(file_id).cloned())
    }
    async fn get_file_for_user(&self, file_id: &str, user_id: &str) -> Result<Option<File>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .filter(|f| f.user_id == user_id)
            .cloned())
    }
    async fn list_files(&self, user_id: &str) -> Result<Vec<File>> {
        Ok(self.files.lock().unwrap().values().filter(|f| f.user_id == user_id).cloned().collect())
    }
    async fn update_status(&self, file_id: &str, status: IndexingStatus) -> Result<()> {
        if let Some(file) = self.files.lock().unwrap().get_mut(file_id) {
            file.status = status;
        }
        Ok(())
    }
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.chunks.lock().unwrap().extend_from_slice(chunks);
        Ok(())
    }
    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.files.lock().unwrap().remove(file_id);
        self.chunks.lock().unwrap().retain(|c| c.file_id != file_id);
        Ok(())
    }
}

impl InMemoryMetadataStore {
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    partitions: Mutex<HashMap<String, Vec<VectorRow>>>,
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn create_partition(&self, partition: &str, _dimension: usize) -> Result<()> {
        self.partitions.lock().unwrap().entry(partition.to_string()).or_default();
        Ok(())
    }
    async fn insert(&self, partition: &str, rows: Vec<VectorRow>) -> Result<()> {
        self.partitions.lock().unwrap().entry(partition.to_string()).or_default().extend(rows);
        Ok(())
    }
    async fn search(&self, partitions: &[String], _query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievalHit>> {
        let store = self.partitions.lock().unwrap();
        let mut hits = Vec::new();
        for partition in partitions {
            let Some(rows) = store.get(partition) else { continue };
            let file_id = partition.strip_prefix("file_").unwrap_or(partition).to_string();
            for row in rows.iter().take(top_k) {
                hits.push(RetrievalHit {
                    file_id: file_id.clone(),
                    chunk_index: row.chunk_index,
                    content: row.content.clone(),
                    score: 1.0,
                    metadata: row.metadata.clone(),
                });
            }
        }
        Ok(hits)
    }
    async fn drop_partition(&self, partition: &str) -> Result<()> {
        self.partitions.lock().unwrap().remove(partition);
        Ok(())
    }
}

pub struct FakeEmbeddingService {
    pub dimension: usize,
}

#[async_trait]
impl EmbeddingService for FakeEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32; self.dimension]).collect())
    }
    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Echoes a fixed reply token-by-token, ignoring the prompt content — good
/// enough to exercise the orchestrator's streaming/cancellation wiring.
pub struct FakeLlmService {
    pub reply_tokens: Vec<String>,
}

#[async_trait]
impl LlmService for FakeLlmService {
    async fn chat_stream(&self, _messages: Vec<PromptMessage>, _temperature: f32) -> Result<mpsc::Receiver<Result<LlmToken>>> {
        let (tx, rx) = mpsc::channel(16);
        let tokens = self.reply_tokens.clone();
        tokio::spawn(async move {
            for token in tokens {
                if tx.send(Ok(LlmToken::Delta(token))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(LlmToken::Done)).await;
        });
        Ok(rx)
    }

    async fn chat_once(&self, _messages: Vec<PromptMessage>, _temperature: f32) -> Result<String> {
        Ok(r#"{"intent":"direct","sub_questions":["a?","b?","c?"],"reasoning":"test"}"#.to_string())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    messages: Mutex<HashMap<String, Vec<Message>>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        self.messages.lock().unwrap().entry(session_id.to_string()).or_default().push(message);
        Ok(())
    }
    async fn get_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let all = self.messages.lock().unwrap().get(session_id).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) if all.len() > n => all[all.len() - n..].to_vec(),
            _ => all,
        })
    }
    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.messages.lock().unwrap().remove(session_id);
        Ok(())
    }
}
