mod common;

use pretty_assertions::assert_eq;

use common::{FakeEmbeddingService, InMemoryMetadataStore, InMemoryVectorIndex};
use docrag::backing::{EmbeddingService, MetadataStore, VectorIndex};
use docrag::config::Config;
use docrag::domain::IndexingStatus;
use docrag::ingestion::pipeline::IngestionPipeline;
use std::sync::Arc;
use std::time::Duration;

fn test_config(upload_dir: &str) -> Config {
    Config {
        max_file_size: 1_000_000,
        hierarchical_chunk_sizes: [200, 100, 50],
        hierarchical_overlap: 20,
        embedding_dimension: 4,
        context_budget_chars: 2000,
        llm_temperature_default: 0.7,
        llm_parallelism: 4,
        sse_heartbeat: Duration::from_secs(15),
        cache_ttl_embedding: Duration::from_secs(86_400),
        cache_ttl_expansion: Duration::from_secs(3600),
        sqlite_path: ":memory:".to_string(),
        lance_db_dir: "unused".to_string(),
        redis_url: "unused".to_string(),
        llm_base_url: "unused".to_string(),
        default_llm_model: "unused".to_string(),
        embedding_model: "unused".to_string(),
        upload_dir: upload_dir.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

#[tokio::test]
async fn ingests_a_text_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let metadata_concrete = Arc::new(InMemoryMetadataStore::default());
    let metadata: Arc<dyn MetadataStore> = metadata_concrete.clone();
    let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let config = Arc::new(test_config(dir.path().to_str().unwrap()));

    let pipeline = IngestionPipeline::new(metadata.clone(), vector_index.clone(), embedding, config);

    let text = "Paragraph one is here.\n\nParagraph two follows with a bit more text in it.\n\nParagraph three closes things out.";
    let outcome = pipeline.ingest(text.as_bytes().to_vec(), "doc.txt", "11111111-1111-4111-8111-111111111111").await.unwrap();

    assert_eq!(outcome.status, IndexingStatus::Completed);
    assert!(outcome.chunk_count > 0);
    assert_eq!(metadata_concrete.chunk_count(), outcome.chunk_count);

    let stored = metadata.get_file(&outcome.file_id).await.unwrap().unwrap();
    assert_eq!(stored.status, IndexingStatus::Completed);
    assert_eq!(stored.chunk_count, outcome.chunk_count);

    let partition = stored.partition_name();
    let hits = vector_index.search(&[partition], &[0.0; 4], 100).await.unwrap();
    assert_eq!(hits.len(), outcome.chunk_count);
}

#[tokio::test]
async fn rejects_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::default());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let config = Arc::new(test_config(dir.path().to_str().unwrap()));
    let pipeline = IngestionPipeline::new(metadata, vector_index, embedding, config);

    let err = pipeline.ingest(Vec::new(), "empty.txt", "11111111-1111-4111-8111-111111111111").await.unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[tokio::test]
async fn rejects_oversized_file() {
    let dir = tempfile::tempdir().unwrap();
    let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::default());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let mut config = test_config(dir.path().to_str().unwrap());
    config.max_file_size = 10;
    let pipeline = IngestionPipeline::new(metadata, vector_index, embedding, Arc::new(config));

    let err = pipeline
        .ingest(b"this is far more than ten bytes".to_vec(), "big.txt", "11111111-1111-4111-8111-111111111111")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
    assert!(err.to_string().contains("MAX_FILE_SIZE"));
}

#[tokio::test]
async fn rejects_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::default());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let config = Arc::new(test_config(dir.path().to_str().unwrap()));
    let pipeline = IngestionPipeline::new(metadata, vector_index, embedding, config);

    let err = pipeline
        .ingest(b"hello".to_vec(), "archive.zip", "11111111-1111-4111-8111-111111111111")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}
