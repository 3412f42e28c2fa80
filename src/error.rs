//! Crate-wide error type.
//!
//! Every variant carries the stable `kind` string from spec §7 so API
//! responses and SSE `error` events can surface machine-handleable errors
//! without the caller parsing prose.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("file exceeds MAX_FILE_SIZE: {message}")]
    FileTooLarge { message: String },

    #[error("document could not be processed: {0}")]
    UnprocessableDocument(String),

    #[error("id generation exhausted after 3 collisions")]
    IdGenerationExhausted,

    #[error("indexing failed: {0}")]
    IndexingFailed(String),

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM timed out")]
    LlmTimeout,

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error ({correlation_id}): {message}")]
    Internal {
        message: String,
        correlation_id: String,
    },
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The stable machine-readable kind string from spec §7.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "ValidationError",
            AppError::FileTooLarge { .. } => "ValidationError",
            AppError::UnprocessableDocument(_) => "UnprocessableDocument",
            AppError::IdGenerationExhausted => "IDGenerationExhausted",
            AppError::IndexingFailed(_) => "IndexingFailed",
            AppError::RetrievalUnavailable(_) => "RetrievalUnavailable",
            AppError::LlmUnavailable(_) => "LLMUnavailable",
            AppError::LlmTimeout => "LLMTimeout",
            AppError::CacheUnavailable(_) => "CacheUnavailable",
            AppError::Cancelled => "Cancelled",
            AppError::NotFound(_) => "NotFound",
            AppError::Internal { .. } => "Internal",
        }
    }

    /// Whether a client may usefully retry the whole request.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            AppError::RetrievalUnavailable(_) | AppError::LlmUnavailable(_) | AppError::LlmTimeout
        )
    }

    /// Render as the `error` SSE payload defined in spec §6.2.
    pub fn to_sse_payload(&self) -> serde_json::Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retriable": self.retriable(),
        })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    error: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnprocessableDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::IdGenerationExhausted => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IndexingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Cancelled => StatusCode::BAD_REQUEST,
            AppError::RetrievalUnavailable(_)
            | AppError::LlmUnavailable(_)
            | AppError::LlmTimeout
            | AppError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self, "internal error surfaced to client");
        }

        let body = ErrorBody {
            detail: ErrorDetail {
                error: self.kind(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::internal(format!("database error: {e}"))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::CacheUnavailable(e.to_string())
    }
}

impl From<lancedb::Error> for AppError {
    fn from(e: lancedb::Error) -> Self {
        AppError::RetrievalUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::LlmTimeout
        } else {
            AppError::LlmUnavailable(e.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::internal(format!("io error: {e}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::internal(format!("serialization error: {e}"))
    }
}
