//! The HTTP surface (C13, spec §4.8): upload, chat streaming, session
//! read, file delete, health.

pub mod dto;
pub mod handlers;
pub mod sse;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_file_size as usize;

    Router::new()
        .route("/api/v1/upload", post(handlers::upload).layer(DefaultBodyLimit::max(max_body)))
        .route("/api/v1/chat/stream", post(handlers::chat_stream))
        .route("/api/v1/sessions/{session_id}", get(handlers::get_session))
        .route("/api/v1/files/{file_id}", delete(handlers::delete_file))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
