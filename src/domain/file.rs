use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIME-derived file type, restricted to the four ingestible extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Md,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" => Some(FileType::Txt),
            "md" => Some(FileType::Md),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Md => "md",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    Pending,
    Indexing,
    Completed,
    Failed,
}

impl IndexingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingStatus::Pending => "pending",
            IndexingStatus::Indexing => "indexing",
            IndexingStatus::Completed => "completed",
            IndexingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for IndexingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndexingStatus::Pending),
            "indexing" => Ok(IndexingStatus::Indexing),
            "completed" => Ok(IndexingStatus::Completed),
            "failed" => Ok(IndexingStatus::Failed),
            other => anyhow::bail!("unknown indexing status: {other}"),
        }
    }
}

/// A single uploaded document (spec §3, "File").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub file_id: String,
    pub original_name: String,
    pub file_type: FileType,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub user_id: String,
    pub chunk_count: usize,
    pub status: IndexingStatus,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl File {
    /// Partition name for this file's vectors — always `file_{file_id}`.
    pub fn partition_name(&self) -> String {
        partition_name_for(&self.file_id)
    }
}

pub fn partition_name_for(file_id: &str) -> String {
    format!("file_{file_id}")
}
