//! HTTP LLM client (C6, spec §4.6, §6.3): an OpenAI-compatible
//! `/chat/completions` endpoint, called both streaming (generation phase)
//! and non-streaming (query expansion, spec §4.2).

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::{LlmService, LlmToken};
use crate::error::{AppError, Result};
use crate::query::assembler::PromptMessage;

const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize, Default)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpLlmService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    /// Caps concurrent streaming generation calls at `LLM_PARALLELISM`
    /// (spec §5: "a global semaphore caps concurrent LLM streaming calls").
    /// Non-streaming calls (query expansion) are not gated by this.
    streaming_slots: Arc<Semaphore>,
}

impl HttpLlmService {
    pub fn new(base_url: String, model: String, parallelism: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("reqwest client builds with default TLS backend");
        HttpLlmService { client, base_url, model, streaming_slots: Arc::new(Semaphore::new(parallelism.max(1))) }
    }
}

#[async_trait]
impl LlmService for HttpLlmService {
    async fn chat_stream(
        &self,
        messages: Vec<PromptMessage>,
        temperature: f32,
    ) -> Result<mpsc::Receiver<Result<LlmToken>>> {
        let permit = self
            .streaming_slots
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest { model: &self.model, messages: &messages, temperature, stream: true };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmUnavailable(format!("LLM service returned {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let _permit = permit;
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(AppError::from(e))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event.lines() {
                        let Some(payload) = line.strip_prefix("data: ") else { continue };
                        if payload.trim() == "[DONE]" {
                            let _ = tx.send(Ok(LlmToken::Done)).await;
                            return;
                        }
                        match serde_json::from_str::<ChatStreamChunk>(payload) {
                            Ok(chunk) => {
                                for choice in chunk.choices {
                                    if let Some(content) = choice.delta.content {
                                        if tx.send(Ok(LlmToken::Delta(content))).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed stream chunk");
                            }
                        }
                    }
                }
            }
            let _ = tx.send(Ok(LlmToken::Done)).await;
        });

        Ok(rx)
    }

    async fn chat_once(&self, messages: Vec<PromptMessage>, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest { model: &self.model, messages: &messages, temperature, stream: false };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmUnavailable(format!("LLM service returned {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LlmUnavailable("empty choices in LLM response".to_string()))
    }
}
