use serde::{Deserialize, Serialize};

/// Cached product of the Query Expander (spec §3, "QueryExpansion").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExpansion {
    pub original_query: String,
    pub intent: String,
    pub sub_questions: Vec<String>,
    pub reasoning: String,
    #[serde(skip)]
    pub cache_hit: bool,
    #[serde(skip)]
    pub elapsed_ms: u64,
}

impl QueryExpansion {
    /// The degenerate fallback used when the LLM call or its JSON parse
    /// fails twice (spec §4.2).
    pub fn degenerate(query: &str) -> Self {
        QueryExpansion {
            original_query: query.to_string(),
            intent: "direct".to_string(),
            sub_questions: vec![query.to_string()],
            reasoning: String::new(),
            cache_hit: false,
            elapsed_ms: 0,
        }
    }

    pub fn is_schema_valid(&self) -> bool {
        (3..=5).contains(&self.sub_questions.len()) && !self.intent.is_empty()
    }
}
