//! Query Expander (C8, spec §4.2): rewrites a query into an intent label
//! plus 3–5 sub-questions, cached and strictly advisory to retrieval only.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicode_normalization::UnicodeNormalization;

use crate::backing::cache::expansion_key;
use crate::backing::{Cache, LlmService};
use crate::domain::QueryExpansion;
use crate::query::assembler::PromptMessage;

const EXPANSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Deserialize)]
struct ExpansionPayload {
    intent: String,
    sub_questions: Vec<String>,
    reasoning: String,
}

pub struct QueryExpander {
    cache: Arc<dyn Cache>,
    llm: Arc<dyn LlmService>,
}

impl QueryExpander {
    pub fn new(cache: Arc<dyn Cache>, llm: Arc<dyn LlmService>) -> Self {
        QueryExpander { cache, llm }
    }

    fn cache_key(query: &str, locale: &str) -> String {
        let normalized = format!("{}|{}", query.nfkc().collect::<String>().trim().to_lowercase(), locale);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        expansion_key(&hex::encode(hasher.finalize()))
    }

    pub async fn expand(&self, query: &str, locale: &str) -> QueryExpansion {
        let started = Instant::now();
        let key = Self::cache_key(query, locale);

        if let Ok(Some(bytes)) = self.cache.get(&key).await {
            if let Ok(mut cached) = serde_json::from_slice::<QueryExpansion>(&bytes) {
                cached.cache_hit = true;
                cached.elapsed_ms = started.elapsed().as_millis() as u64;
                return cached;
            }
        }

        let expansion = match self.call_llm(query).await {
            Some(payload) if (3..=5).contains(&payload.sub_questions.len()) && !payload.intent.is_empty() => {
                QueryExpansion {
                    original_query: query.to_string(),
                    intent: payload.intent,
                    sub_questions: payload.sub_questions,
                    reasoning: payload.reasoning,
                    cache_hit: false,
                    elapsed_ms: 0,
                }
            }
            _ => match self.call_llm_strict(query).await {
                Some(payload) if (3..=5).contains(&payload.sub_questions.len()) && !payload.intent.is_empty() => {
                    QueryExpansion {
                        original_query: query.to_string(),
                        intent: payload.intent,
                        sub_questions: payload.sub_questions,
                        reasoning: payload.reasoning,
                        cache_hit: false,
                        elapsed_ms: 0,
                    }
                }
                _ => QueryExpansion::degenerate(query),
            },
        };

        if expansion.is_schema_valid() {
            if let Ok(bytes) = serde_json::to_vec(&expansion) {
                if let Err(e) = self.cache.set(&key, bytes, EXPANSION_TTL).await {
                    tracing::warn!(error = %e, "failed to cache query expansion");
                }
            }
        }

        let mut expansion = expansion;
        expansion.elapsed_ms = started.elapsed().as_millis() as u64;
        expansion
    }

    async fn call_llm(&self, query: &str) -> Option<ExpansionPayload> {
        let instruction = format!(
            "Rewrite the following user question into a JSON object with exactly these keys: \
             \"intent\" (a short label), \"sub_questions\" (an array of 3 to 5 distinct, more specific \
             questions that would help retrieve relevant passages), and \"reasoning\" (a brief internal \
             note, not shown to the user). Respond with ONLY the JSON object, no surrounding text.\n\n\
             Question: {query}"
        );
        self.ask_for_json(&instruction).await
    }

    async fn call_llm_strict(&self, query: &str) -> Option<ExpansionPayload> {
        let instruction = format!(
            "Your previous response could not be parsed as JSON. Respond with STRICTLY valid JSON and \
             nothing else: {{\"intent\": string, \"sub_questions\": [string, string, string], \"reasoning\": string}}.\n\n\
             Question: {query}"
        );
        self.ask_for_json(&instruction).await
    }

    async fn ask_for_json(&self, instruction: &str) -> Option<ExpansionPayload> {
        let messages = vec![PromptMessage { role: "user", content: instruction.to_string() }];
        let raw = self.llm.chat_once(messages, 0.0).await.ok()?;
        let trimmed = raw.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
        serde_json::from_str::<ExpansionPayload>(trimmed.trim()).ok()
    }
}
