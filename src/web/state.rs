//! Shared Axum state: the backing-service handles plus the two pipeline
//! objects built from them. Unlike the two-phase pattern this crate is
//! otherwise modeled on, every backing handle here is ready by the time
//! `AppState` is constructed — there is no background warm-up phase,
//! because none of C1–C6 requires one (the one true once-only latch, the
//! Metadata/Session Store schema migration, is internal to those structs).

use std::sync::Arc;

use crate::backing::{Cache, EmbeddingService, LlmService, MetadataStore, SessionStore, VectorIndex};
use crate::config::Config;
use crate::ingestion::pipeline::IngestionPipeline;
use crate::query::orchestrator::PipelineOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn Cache>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub embedding: Arc<dyn EmbeddingService>,
    pub llm: Arc<dyn LlmService>,
    pub ingestion: Arc<IngestionPipeline>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}
