//! Pipeline Orchestrator (C11, spec §4.6): sequences expand → retrieve →
//! assemble → generate, emitting phase events and tokens, and writes the
//! session transcript via the Session Store.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backing::{Cache, EmbeddingService, LlmService, LlmToken, SessionStore, VectorIndex};
use crate::config::Config;
use crate::domain::{Message, MessageRole};
use crate::error::AppError;
use crate::query::assembler::PromptAssembler;
use crate::query::expander::QueryExpander;
use crate::query::retriever::Retriever;

/// One event in the stream the orchestrator produces. Maps 1:1 onto the
/// SSE event types of spec §6.2; the web layer is responsible for the
/// wire framing (`event: <type>\ndata: <json>\n\n`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress { phase: u8, progress: u8, #[serde(skip_serializing_if = "Option::is_none")] message: Option<String> },
    QueryExpansion { original_query: String, intent: String, sub_questions: Vec<String>, cache_hit: bool },
    RetrievalComplete { chunk_count: usize, file_ids: Vec<String> },
    MarkdownToken { token: String },
    Metadata { sources: Vec<SourceRef>, token_count: usize },
    Ping,
    Complete,
    Error { kind: String, message: String, retriable: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub file_id: String,
    pub chunk_index: usize,
}

pub struct PipelineRequest {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub file_ids: Vec<String>,
    pub locale: String,
    pub temperature: f32,
    pub top_k: usize,
    pub enable_expansion: bool,
}

pub struct PipelineOrchestrator {
    expander: QueryExpander,
    retriever: Retriever,
    assembler: PromptAssembler,
    llm: Arc<dyn LlmService>,
    sessions: Arc<dyn SessionStore>,
}

impl PipelineOrchestrator {
    pub fn new(
        cache: Arc<dyn Cache>,
        embedding: Arc<dyn EmbeddingService>,
        vector_index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmService>,
        sessions: Arc<dyn SessionStore>,
        config: &Config,
    ) -> Self {
        PipelineOrchestrator {
            expander: QueryExpander::new(cache, llm.clone()),
            retriever: Retriever::new(embedding, vector_index),
            assembler: PromptAssembler::new(config.context_budget_chars),
            llm,
            sessions,
        }
    }

    /// Runs one chat turn, sending events on `tx` until `complete` or
    /// `error`. `cancel` is checked cooperatively at every await point
    /// inside the generation phase (spec §5 cancellation).
    pub async fn run(&self, request: PipelineRequest, tx: mpsc::Sender<PipelineEvent>, cancel: CancellationToken) {
        let user_message = Message {
            role: MessageRole::User,
            content: request.query.clone(),
            created_at: chrono::Utc::now(),
            metadata: Default::default(),
        };
        if let Err(e) = self.sessions.append_message(&request.session_id, user_message).await {
            let _ = tx.send(PipelineEvent::Error { kind: e.kind().to_string(), message: e.to_string(), retriable: e.retriable() }).await;
            return;
        }

        let _ = tx.send(PipelineEvent::Progress { phase: 1, progress: 0, message: None }).await;

        let expansion = if request.enable_expansion {
            self.expander.expand(&request.query, &request.locale).await
        } else {
            crate::domain::QueryExpansion::degenerate(&request.query)
        };

        let _ = tx.send(PipelineEvent::Progress { phase: 1, progress: 100, message: None }).await;
        let _ = tx
            .send(PipelineEvent::QueryExpansion {
                original_query: expansion.original_query.clone(),
                intent: expansion.intent.clone(),
                sub_questions: expansion.sub_questions.clone(),
                cache_hit: expansion.cache_hit,
            })
            .await;

        if cancel.is_cancelled() {
            self.persist_truncated(&request.session_id, "", true, &[], &request.file_ids, None).await;
            return;
        }

        let _ = tx.send(PipelineEvent::Progress { phase: 2, progress: 0, message: None }).await;

        let mut queries = expansion.sub_questions.clone();
        queries.push(request.query.clone());

        let outcome = match self.retriever.retrieve(&queries, &request.file_ids, request.top_k, None).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = tx.send(PipelineEvent::Error { kind: e.kind().to_string(), message: e.to_string(), retriable: e.retriable() }).await;
                return;
            }
        };
        let hits = outcome.hits;
        let retrieval_warning = outcome.warning;
        if let Some(warning) = &retrieval_warning {
            tracing::warn!(session_id = %request.session_id, warning, "retrieval partially failed");
        }

        let _ = tx
            .send(PipelineEvent::RetrievalComplete {
                chunk_count: hits.len(),
                file_ids: request.file_ids.clone(),
            })
            .await;
        let _ = tx.send(PipelineEvent::Progress { phase: 2, progress: 100, message: None }).await;

        let _ = tx.send(PipelineEvent::Progress { phase: 3, progress: 0, message: None }).await;
        let history = self.sessions.get_messages(&request.session_id, Some(20)).await.unwrap_or_default();
        let prompt = self.assembler.build(&request.query, &hits, &history, &request.locale);
        let _ = tx.send(PipelineEvent::Progress { phase: 3, progress: 100, message: None }).await;

        let _ = tx.send(PipelineEvent::Progress { phase: 4, progress: 0, message: None }).await;

        let mut rx = match self.llm.chat_stream(prompt, request.temperature.clamp(0.0, 2.0)).await {
            Ok(rx) => rx,
            Err(e) => {
                let _ = tx.send(PipelineEvent::Error { kind: e.kind().to_string(), message: e.to_string(), retriable: e.retriable() }).await;
                self.persist_truncated(&request.session_id, "", true, &hits, &request.file_ids, retrieval_warning.as_deref()).await;
                return;
            }
        };

        let mut accumulated = String::new();
        let mut truncated = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    truncated = true;
                    break;
                }
                token = rx.recv() => {
                    match token {
                        Some(Ok(LlmToken::Delta(text))) => {
                            accumulated.push_str(&text);
                            if tx.send(PipelineEvent::MarkdownToken { token: text }).await.is_err() {
                                truncated = true;
                                break;
                            }
                        }
                        Some(Ok(LlmToken::Done)) => break,
                        Some(Err(e)) => {
                            let _ = tx.send(PipelineEvent::Error { kind: e.kind().to_string(), message: e.to_string(), retriable: e.retriable() }).await;
                            self.persist_truncated(&request.session_id, &accumulated, true, &hits, &request.file_ids, retrieval_warning.as_deref()).await;
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = tx.send(PipelineEvent::Progress { phase: 4, progress: 100, message: None }).await;

        let token_count = crate::query::token_count(&accumulated);
        let sources: Vec<SourceRef> = hits.iter().map(|h| SourceRef { file_id: h.file_id.clone(), chunk_index: h.chunk_index }).collect();
        let _ = tx.send(PipelineEvent::Metadata { sources: sources.clone(), token_count }).await;

        self.persist_truncated(&request.session_id, &accumulated, truncated, &hits, &request.file_ids, retrieval_warning.as_deref()).await;

        if truncated {
            return;
        }
        let _ = tx.send(PipelineEvent::Complete).await;
    }

    /// Persists the assistant's turn with the session metadata spec §3
    /// describes: sub-question expansion is already on the user message,
    /// this message carries the retrieved chunk count and referenced file
    /// ids, plus any partial-retrieval warning (spec §4.3).
    async fn persist_truncated(
        &self,
        session_id: &str,
        content: &str,
        truncated: bool,
        hits: &[crate::domain::RetrievalHit],
        file_ids: &[String],
        retrieval_warning: Option<&str>,
    ) {
        let mut metadata = std::collections::HashMap::new();
        if truncated {
            metadata.insert("truncated".to_string(), serde_json::Value::Bool(true));
        }
        metadata.insert("retrieved_chunk_count".to_string(), serde_json::json!(hits.len()));
        metadata.insert("file_ids".to_string(), serde_json::json!(file_ids));
        let sources: Vec<SourceRef> = hits.iter().map(|h| SourceRef { file_id: h.file_id.clone(), chunk_index: h.chunk_index }).collect();
        metadata.insert("sources".to_string(), serde_json::json!(sources));
        if let Some(warning) = retrieval_warning {
            metadata.insert("retrieval_warning".to_string(), serde_json::json!(warning));
        }

        let message = Message {
            role: MessageRole::Assistant,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
            metadata,
        };
        if let Err(e) = self.sessions.append_message(session_id, message).await {
            tracing::error!(error = %e, "failed to persist assistant message");
        }
    }
}
