//! Retrieval-augmented document question-answering service.
//!
//! Every backing-service handle (C1–C6) is constructed before the listener
//! binds. There is no background warm-up phase — the one true once-only
//! latch in this system is internal to the Metadata/Session Store (see
//! `backing::metadata_store`), guarding schema migration rather than
//! server startup.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use docrag::backing;
use docrag::backing::cache::RedisCache;
use docrag::backing::embedding::HttpEmbeddingService;
use docrag::backing::llm::HttpLlmService;
use docrag::backing::metadata_store::SqliteMetadataStore;
use docrag::backing::session_store::SqliteSessionStore;
use docrag::backing::vector_index::LanceVectorIndex;
use docrag::config::Config;
use docrag::ingestion::pipeline::IngestionPipeline;
use docrag::query::orchestrator::PipelineOrchestrator;
use docrag::web;
use docrag::web::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(bind_addr = %config.bind_addr, "starting docrag");

    let cache: Arc<dyn backing::Cache> = Arc::new(RedisCache::connect(&config.redis_url).await?);

    let vector_index: Arc<dyn backing::VectorIndex> =
        Arc::new(LanceVectorIndex::open(&config.lance_db_dir, config.embedding_dimension).await?);

    let metadata_store_impl = SqliteMetadataStore::connect(&config.sqlite_path).await?;
    metadata_store_impl.ensure_initialized().await?;
    let metadata_store: Arc<dyn backing::MetadataStore> = Arc::new(metadata_store_impl);

    let session_store_impl = SqliteSessionStore::connect(&config.sqlite_path).await?;
    session_store_impl.ensure_initialized().await?;
    let session_store: Arc<dyn backing::SessionStore> = Arc::new(session_store_impl);

    let embedding: Arc<dyn backing::EmbeddingService> = Arc::new(HttpEmbeddingService::new(
        cache.clone(),
        config.llm_base_url.clone(),
        config.embedding_model.clone(),
        config.embedding_dimension,
    ));

    let llm: Arc<dyn backing::LlmService> = Arc::new(HttpLlmService::new(
        config.llm_base_url.clone(),
        config.default_llm_model.clone(),
        config.llm_parallelism,
    ));

    let ingestion = Arc::new(IngestionPipeline::new(
        metadata_store.clone(),
        vector_index.clone(),
        embedding.clone(),
        config.clone(),
    ));

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        cache.clone(),
        embedding.clone(),
        vector_index.clone(),
        llm.clone(),
        session_store.clone(),
        &config,
    ));

    let state = AppState {
        config: config.clone(),
        cache,
        vector_index,
        metadata_store,
        session_store,
        embedding,
        llm,
        ingestion,
        orchestrator,
    };

    let app = web::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
