//! Axum handlers for the Request API (C13, spec §4.8).

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::Sse;
use axum::Json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::ids::validate_user_id;
use crate::query::orchestrator::PipelineRequest;

use super::dto::{ChatRequest, HealthResponse, HealthServices, SessionResponse, UploadResponse};
use super::sse::OrchestratorEventStream;
use super::state::AppState;

const MAX_QUERY_CHARS: usize = 2000;

fn require_user_id(headers: &HeaderMap) -> Result<String> {
    let raw = headers
        .get("user_id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation { message: "user_id header is required".to_string() })?;
    validate_user_id(raw)?;
    Ok(raw.to_string())
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let user_id = require_user_id(&headers)?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation { message: e.to_string() })? {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            file_bytes = Some(field.bytes().await.map_err(|e| AppError::Validation { message: e.to_string() })?.to_vec());
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::Validation { message: "multipart field 'file' is required".to_string() })?;
    let filename = filename.unwrap_or_else(|| "upload".to_string());

    let outcome = state.ingestion.ingest(file_bytes.clone(), &filename, &user_id).await?;

    Ok(Json(UploadResponse {
        file_id: outcome.file_id,
        filename,
        file_size: file_bytes.len() as u64,
        chunk_count: outcome.chunk_count,
        embedding_status: "completed",
        message: "file ingested successfully".to_string(),
    }))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<OrchestratorEventStream>> {
    let user_id = require_user_id(&headers)?;

    if body.query.is_empty() || body.query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::Validation { message: format!("query must be 1..{MAX_QUERY_CHARS} characters") });
    }
    if body.file_ids.is_empty() {
        return Err(AppError::Validation { message: "At least one file_id is required".to_string() });
    }
    for file_id in &body.file_ids {
        state
            .metadata_store
            .get_file_for_user(file_id, &user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {file_id} not found")))?;
    }

    let session_id = body.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = PipelineRequest {
        session_id,
        user_id,
        query: body.query,
        file_ids: body.file_ids,
        locale: body.locale,
        temperature: body.temperature.unwrap_or(state.config.llm_temperature_default).clamp(0.0, 2.0),
        top_k: body.top_k.clamp(1, 20),
        enable_expansion: body.enable_expansion,
    };

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let cancel = CancellationToken::new();
    let orchestrator = state.orchestrator.clone();
    let cancel_for_task = cancel.clone();

    tokio::spawn(async move {
        orchestrator.run(request, tx, cancel_for_task).await;
    });

    let stream = OrchestratorEventStream::new(rx, Duration::from_secs(state.config.sse_heartbeat.as_secs()), cancel);
    Ok(super::sse::into_sse_response(stream))
}

pub async fn get_session(State(state): State<AppState>, Path(session_id): Path<String>) -> Result<Json<SessionResponse>> {
    let messages = state.session_store.get_messages(&session_id, None).await?;
    Ok(Json(SessionResponse { session_id, messages }))
}

pub async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<StatusCode> {
    let user_id = require_user_id(&headers)?;

    let file = state
        .metadata_store
        .get_file_for_user(&file_id, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {file_id} not found")))?;

    let _ = state.vector_index.drop_partition(&file.partition_name()).await;
    state.metadata_store.delete_file(&file_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    // Cheap probes only: an empty embed() call and a lookup-by-sentinel-key
    // touch each client's connection without mutating state. The LLM has no
    // equally cheap probe over this narrow contract, so its liveness is
    // inferred from process health rather than a live round-trip.
    let cache_ok = state.cache.exists("__healthz_probe__").await.is_ok();
    let vector_ok = state.vector_index.search(&[], &[], 1).await.is_ok();
    let metadata_ok = state.metadata_store.file_exists("__healthz_probe__").await.is_ok();
    let session_ok = state.session_store.get_messages("__healthz_probe__", Some(1)).await.is_ok();
    let embedding_ok = state.embedding.embed(&[]).await.is_ok();
    let llm_ok = true;

    let services = HealthServices {
        cache: cache_ok,
        vector_index: vector_ok,
        metadata_store: metadata_ok,
        session_store: session_ok,
        embedding: embedding_ok,
        llm: llm_ok,
    };
    let all_ok = services.cache && services.vector_index && services.metadata_store && services.session_store && services.embedding && services.llm;

    Json(HealthResponse { status: if all_ok { "ok" } else { "degraded" }, services })
}
