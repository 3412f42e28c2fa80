//! HTTP embedding client (C5, spec §4.1 step 7, §6.3): an OpenAI-compatible
//! `/embeddings` endpoint, called in batches and fronted by the `emb:`
//! cache namespace (spec §4.4) so repeated text never re-embeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::cache::embedding_key;
use super::{Cache, EmbeddingService};
use crate::error::{AppError, Result};

const DEFAULT_BATCH_SIZE: usize = 64;
const EMBEDDING_CACHE_TTL: Duration = Duration::from_secs(86_400);

fn cache_key_for(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    embedding_key(&hex::encode(hasher.finalize()))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

pub struct HttpEmbeddingService {
    client: reqwest::Client,
    cache: Arc<dyn Cache>,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HttpEmbeddingService {
    pub fn new(cache: Arc<dyn Cache>, base_url: String, model: String, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with default TLS backend");
        HttpEmbeddingService { client, cache, base_url, model, dimension, batch_size: DEFAULT_BATCH_SIZE }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest { model: &self.model, input: batch };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RetrievalUnavailable(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let mut ordered = vec![Vec::new(); batch.len()];
        for datum in parsed.data {
            if datum.index < ordered.len() {
                ordered[datum.index] = datum.embedding;
            }
        }
        Ok(ordered)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = cache_key_for(&self.model, text);
            match self.cache.get(&key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Vec<f32>>(&bytes) {
                    Ok(vector) => out[i] = Some(vector),
                    Err(_) => misses.push(i),
                },
                _ => misses.push(i),
            }
        }

        for batch_indices in misses.chunks(self.batch_size) {
            let batch_texts: Vec<String> = batch_indices.iter().map(|&i| texts[i].clone()).collect();

            let mut attempt = 0;
            let vectors = loop {
                match self.embed_batch(&batch_texts).await {
                    Ok(vectors) => break vectors,
                    Err(e) if attempt < 2 => {
                        attempt += 1;
                        let backoff_ms = if attempt == 1 { 250 } else { 1000 };
                        tracing::warn!(attempt, error = %e, "embedding batch failed, retrying");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    }
                    Err(e) => return Err(e),
                }
            };

            for (&i, vector) in batch_indices.iter().zip(vectors.into_iter()) {
                if let Ok(bytes) = serde_json::to_vec(&vector) {
                    let key = cache_key_for(&self.model, &texts[i]);
                    if let Err(e) = self.cache.set(&key, bytes, EMBEDDING_CACHE_TTL).await {
                        tracing::warn!(error = %e, "failed to cache embedding");
                    }
                }
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
