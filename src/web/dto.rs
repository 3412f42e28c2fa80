//! Request/response bodies for the Request API (C13, spec §4.8, §6.1).

use serde::{Deserialize, Serialize};

fn default_locale() -> String {
    "zh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub file_ids: Vec<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_true")]
    pub enable_expansion: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Falls back to `LLM_TEMPERATURE_DEFAULT` (spec §6.5) when omitted.
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub file_size: u64,
    pub chunk_count: usize,
    pub embedding_status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub messages: Vec<crate::domain::Message>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: HealthServices,
}

#[derive(Debug, Serialize)]
pub struct HealthServices {
    pub cache: bool,
    pub vector_index: bool,
    pub metadata_store: bool,
    pub session_store: bool,
    pub embedding: bool,
    pub llm: bool,
}
