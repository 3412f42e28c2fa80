use serde::Serialize;
use std::collections::HashMap;

/// A single retrieved chunk, scored against a query (spec §3, "RetrievalHit").
///
/// Higher `score` means more similar; `Ord`/`PartialOrd` are not derived
/// because similarity is a float — ranking is done explicitly by the
/// retriever, tie-broken by `(file_id, chunk_index)` for stability.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub file_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RetrievalHit {
    pub fn identity(&self) -> (String, usize) {
        (self.file_id.clone(), self.chunk_index)
    }
}
