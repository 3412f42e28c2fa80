mod common;

use common::{FakeEmbeddingService, FakeLlmService, InMemoryCache, InMemorySessionStore, InMemoryVectorIndex};
use docrag::backing::{Cache, EmbeddingService, LlmService, SessionStore, VectorIndex, VectorRow};
use docrag::config::Config;
use docrag::query::orchestrator::{PipelineEvent, PipelineOrchestrator, PipelineRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn test_config() -> Config {
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
        upload_dir: "unused".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

async fn seeded_vector_index(file_id: &str) -> Arc<dyn VectorIndex> {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::default());
    let partition = format!("file_{file_id}");
    index.create_partition(&partition, 4).await.unwrap();
    index
        .insert(
            &partition,
            vec![VectorRow {
                chunk_index: 0,
                content: "the only chunk in this file".to_string(),
                vector: vec![0.1, 0.2, 0.3, 0.4],
                metadata: Default::default(),
            }],
        )
        .await
        .unwrap();
    index
}

#[tokio::test]
async fn runs_a_full_turn_and_persists_the_transcript() {
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let vector_index = seeded_vector_index("doc1").await;
    let llm: Arc<dyn LlmService> = Arc::new(FakeLlmService { reply_tokens: vec!["Hello".into(), ", ".into(), "world".into()] });
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::default());
    let config = test_config();

    let orchestrator = PipelineOrchestrator::new(cache, embedding, vector_index, llm, sessions.clone(), &config);

    let request = PipelineRequest {
        session_id: "s1".to_string(),
        user_id: "11111111-1111-4111-8111-111111111111".to_string(),
        query: "What does the document say?".to_string(),
        file_ids: vec!["doc1".to_string()],
        locale: "en".to_string(),
        temperature: 0.7,
        top_k: 5,
        enable_expansion: false,
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    orchestrator.run(request, tx, CancellationToken::new()).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(events.iter().any(|e| matches!(e, PipelineEvent::RetrievalComplete { chunk_count, .. } if *chunk_count == 1)));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::MarkdownToken { token } if token == "Hello")));
    assert!(matches!(events.last(), Some(PipelineEvent::Complete)));

    let history = sessions.get_messages("s1", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Hello, world");
    assert_eq!(history[1].metadata.get("retrieved_chunk_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(history[1].metadata.get("file_ids").and_then(|v| v.as_array()).map(|a| a.len()), Some(1));
    assert!(history[1].metadata.get("sources").and_then(|v| v.as_array()).is_some_and(|a| !a.is_empty()));
}

#[tokio::test]
async fn cancellation_persists_a_truncated_message_and_suppresses_complete() {
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::default());
    let embedding: Arc<dyn EmbeddingService> = Arc::new(FakeEmbeddingService { dimension: 4 });
    let vector_index = seeded_vector_index("doc1").await;
    let llm: Arc<dyn LlmService> = Arc::new(FakeLlmService { reply_tokens: vec!["partial".into()] });
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::default());
    let config = test_config();

    let orchestrator = PipelineOrchestrator::new(cache, embedding, vector_index, llm, sessions.clone(), &config);

    let request = PipelineRequest {
        session_id: "s2".to_string(),
        user_id: "11111111-1111-4111-8111-111111111111".to_string(),
        query: "question".to_string(),
        file_ids: vec!["doc1".to_string()],
        locale: "en".to_string(),
        temperature: 0.7,
        top_k: 5,
        enable_expansion: false,
    };

    let cancel = CancellationToken::new();
    cancel.cancel();

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    orchestrator.run(request, tx, cancel).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Complete)));

    let history = sessions.get_messages("s2", None).await.unwrap();
    let assistant = history.last().unwrap();
    assert_eq!(assistant.metadata.get("truncated").and_then(|v| v.as_bool()), Some(true));
}
