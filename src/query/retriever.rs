//! Retriever (C9, spec §4.3): fans out embedding + ANN search across
//! sub-questions and the caller's selected files, then dedupes and ranks.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backing::{EmbeddingService, VectorIndex};
use crate::domain::{file::partition_name_for, RetrievalHit};
use crate::error::{AppError, Result};

/// Bound on concurrently in-flight per-query partition searches (spec §5:
/// "the orchestrator spawns bounded child tasks ... for per-partition
/// searches"). Retrieval has no dedicated config knob, so this is fixed.
const MAX_CONCURRENT_SEARCHES: usize = 8;

/// Result of one retrieval pass: the merged hits plus, per spec §4.3's
/// partial-partition-failure policy, a warning when some (but not all)
/// per-query searches failed rather than contributing hits.
pub struct RetrievalOutcome {
    pub hits: Vec<RetrievalHit>,
    pub warning: Option<String>,
}

pub struct Retriever {
    embedding: Arc<dyn EmbeddingService>,
    vector_index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedding: Arc<dyn EmbeddingService>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Retriever { embedding, vector_index }
    }

    /// `queries` is the expansion's sub-questions plus the original query
    /// (spec §4.3). `top_k` bounds per-partition search depth; the merged
    /// result is truncated to `5 * queries.len()` unless `global_limit` is given.
    pub async fn retrieve(
        &self,
        queries: &[String],
        file_ids: &[String],
        top_k: usize,
        global_limit: Option<usize>,
    ) -> Result<RetrievalOutcome> {
        if queries.is_empty() || file_ids.is_empty() {
            return Ok(RetrievalOutcome { hits: Vec::new(), warning: None });
        }

        let query_vectors = self.embedding.embed(queries).await?;
        let partitions: Vec<String> = file_ids.iter().map(|id| partition_name_for(id)).collect();

        let results: Vec<Result<Vec<RetrievalHit>>> = stream::iter(query_vectors.iter())
            .map(|query_vector| {
                let vector_index = &self.vector_index;
                let partitions = &partitions;
                async move { vector_index.search(partitions, query_vector, top_k).await }
            })
            .buffer_unordered(MAX_CONCURRENT_SEARCHES)
            .collect()
            .await;

        let mut merged: HashMap<(String, usize), RetrievalHit> = HashMap::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut last_error: Option<AppError> = None;

        for result in results {
            match result {
                Ok(hits) => {
                    succeeded += 1;
                    for hit in hits {
                        let identity = hit.identity();
                        merged
                            .entry(identity)
                            .and_modify(|existing| {
                                if hit.score > existing.score {
                                    *existing = hit.clone();
                                }
                            })
                            .or_insert(hit);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "one retrieval query failed");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            return Err(last_error.unwrap_or_else(|| AppError::RetrievalUnavailable("no partitions returned results".to_string())));
        }

        let mut hits: Vec<RetrievalHit> = merged.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_id.cmp(&b.file_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });

        let limit = global_limit.unwrap_or(5 * queries.len());
        hits.truncate(limit);

        let warning = (failed > 0).then(|| {
            format!(
                "{failed} of {} retrieval queries failed, results may be incomplete: {}",
                failed + succeeded,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            )
        });

        Ok(RetrievalOutcome { hits, warning })
    }
}
