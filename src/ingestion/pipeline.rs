//! Orchestrates one call to `ingest()` (spec §4.1): the only place that
//! touches all of Metadata Store, Vector Index, and Embedding Service for
//! a single upload.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backing::{EmbeddingService, MetadataStore, VectorIndex, VectorRow};
use crate::config::Config;
use crate::domain::{File, FileType, IndexingStatus};
use crate::error::{AppError, Result};
use crate::ids::generate_unique_file_id;

use super::chunker::chunk_hierarchical;
use super::extract::extract_text;

pub struct IngestOutcome {
    pub file_id: String,
    pub chunk_count: usize,
    pub status: IndexingStatus,
}

pub struct IngestionPipeline {
    metadata: Arc<dyn MetadataStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedding: Arc<dyn EmbeddingService>,
    config: Arc<Config>,
}

impl IngestionPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedding: Arc<dyn EmbeddingService>,
        config: Arc<Config>,
    ) -> Self {
        IngestionPipeline { metadata, vector_index, embedding, config }
    }

    pub async fn ingest(&self, file_bytes: Vec<u8>, original_name: &str, user_id: &str) -> Result<IngestOutcome> {
        // 1. Validate.
        let extension = original_name.rsplit('.').next().unwrap_or("");
        let file_type = FileType::from_extension(extension)
            .ok_or_else(|| AppError::Validation { message: format!("unsupported extension: {extension}") })?;

        if file_bytes.is_empty() {
            return Err(AppError::Validation { message: "file is empty".to_string() });
        }
        if file_bytes.len() as u64 > self.config.max_file_size {
            return Err(AppError::FileTooLarge {
                message: format!("file exceeds MAX_FILE_SIZE ({} bytes)", self.config.max_file_size),
            });
        }
        // Extraction doubles as the PDF structural-parse check from step 1:
        // a PDF that fails to parse or yields no pages surfaces here as
        // `UnprocessableDocument` before any file_id is minted.
        let text = extract_text(&file_bytes, file_type)?;
        if text.trim().is_empty() {
            return Err(AppError::UnprocessableDocument("no extractable text".to_string()));
        }

        // 2. Generate file_id, retrying on collision.
        let metadata = self.metadata.clone();
        let file_id = generate_unique_file_id(&file_bytes, move |candidate| {
            let metadata = metadata.clone();
            async move { metadata.file_exists(&candidate).await }
        })
        .await?;

        // 4. Chunk hierarchically.
        let chunks = chunk_hierarchical(&file_id, &text, self.config.hierarchical_chunk_sizes, self.config.hierarchical_overlap);
        if chunks.is_empty() {
            return Err(AppError::UnprocessableDocument("chunking produced no output".to_string()));
        }

        // 5. Enrich + 6. Persist metadata.
        let uploaded_at = chrono::Utc::now();
        let mut metadata_map = HashMap::new();
        metadata_map.insert("chunking_strategy".to_string(), serde_json::json!("hierarchical"));
        metadata_map.insert(
            "size_profile".to_string(),
            serde_json::json!(self.config.hierarchical_chunk_sizes),
        );

        let file = File {
            file_id: file_id.clone(),
            original_name: original_name.to_string(),
            file_type,
            byte_size: file_bytes.len() as u64,
            uploaded_at,
            user_id: user_id.to_string(),
            chunk_count: chunks.len(),
            status: IndexingStatus::Indexing,
            metadata: metadata_map,
        };

        self.metadata.add_file(&file).await?;
        self.metadata.add_chunks(&chunks).await?;

        self.persist_upload(uploaded_at, original_name, &file_bytes).await;

        // 7. Embed and index.
        let partition = file.partition_name();
        if let Err(e) = self.embed_and_index(&partition, &chunks).await {
            self.metadata.update_status(&file_id, IndexingStatus::Failed).await.ok();
            let _ = self.vector_index.drop_partition(&partition).await;
            return Err(e);
        }

        self.metadata.update_status(&file_id, IndexingStatus::Completed).await?;

        Ok(IngestOutcome { file_id, chunk_count: chunks.len(), status: IndexingStatus::Completed })
    }

    async fn embed_and_index(&self, partition: &str, chunks: &[crate::domain::Chunk]) -> Result<()> {
        self.vector_index.create_partition(partition, self.embedding.dimension()).await?;

        const BATCH_SIZE: usize = 64;
        for batch in chunks.chunks(BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embed_with_retry(&texts).await?;

            let rows: Vec<VectorRow> = batch
                .iter()
                .zip(vectors.into_iter())
                .map(|(chunk, vector)| VectorRow {
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    vector,
                    metadata: chunk_metadata(chunk),
                })
                .collect();

            self.vector_index.insert(partition, rows).await?;
        }
        Ok(())
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.embedding.embed(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    let backoff_ms = if attempt == 1 { 250 } else { 1000 };
                    tracing::warn!(attempt, error = %e, "embedding batch failed during ingestion, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(AppError::IndexingFailed(e.to_string())),
            }
        }
    }

    /// Writes the already-read byte buffer to `{upload_dir}/{timestamp}_{safe(filename)}`
    /// (spec §6.4). Best-effort: a failure here does not fail ingestion, since
    /// the authoritative copy of the text already lives in the chunk rows.
    async fn persist_upload(&self, uploaded_at: chrono::DateTime<chrono::Utc>, original_name: &str, bytes: &[u8]) {
        let safe_name: String = original_name
            .chars()
            .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
            .collect();
        let path = std::path::Path::new(&self.config.upload_dir)
            .join(format!("{}_{safe_name}", uploaded_at.timestamp()));
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(error = %e, "failed to create upload_dir");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            tracing::warn!(error = %e, path = %path.display(), "failed to persist uploaded file to disk");
        }
    }
}

fn chunk_metadata(chunk: &crate::domain::Chunk) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert("file_id".to_string(), serde_json::json!(chunk.file_id));
    metadata.insert("level".to_string(), serde_json::json!(chunk.level.as_str()));
    metadata.insert("content_hash".to_string(), serde_json::json!(chunk.content_hash));
    metadata.insert("word_count".to_string(), serde_json::json!(chunk.word_count));
    metadata.insert("position_ratio".to_string(), serde_json::json!(chunk.position_ratio));
    metadata
}
