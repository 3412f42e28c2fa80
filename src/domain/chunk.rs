use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkLevel {
    Large,
    Medium,
    Small,
}

impl ChunkLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkLevel::Large => "large",
            ChunkLevel::Medium => "medium",
            ChunkLevel::Small => "small",
        }
    }
}

/// A piece of a file's text at one granularity level (spec §3, "Chunk").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub file_id: String,
    pub chunk_index: usize,
    pub level: ChunkLevel,
    pub content: String,
    pub char_start: usize,
    pub char_end: usize,
    /// First 16 hex characters of SHA-256(content), used for dedup.
    pub content_hash: String,
    pub word_count: usize,
    pub position_ratio: f64,
}

impl Chunk {
    pub fn word_count_of(text: &str) -> usize {
        text.split_whitespace().count()
    }
}
