//! Embedded LanceDB implementation of `VectorIndex` (C2, spec §4.1 step 7,
//! §6.3). One table per file, named `file_{file_id}` (spec §6.4), opened
//! lazily and cached by name so repeated inserts/searches reuse the handle.

use arrow_array::{Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_array::FixedSizeListArray;
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{VectorIndex, VectorRow};
use crate::domain::RetrievalHit;
use crate::error::{AppError, Result};

fn schema_for(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("metadata_json", DataType::Utf8, false),
    ]))
}

fn rows_to_batch(rows: &[VectorRow], dimension: usize) -> Result<RecordBatch> {
    let schema = schema_for(dimension);

    let chunk_indices = UInt32Array::from_iter_values(rows.iter().map(|r| r.chunk_index as u32));
    let contents = StringArray::from_iter_values(rows.iter().map(|r| r.content.as_str()));
    let metadata_json: Vec<String> = rows
        .iter()
        .map(|r| serde_json::to_string(&r.metadata).unwrap_or_default())
        .collect();
    let metadata_array = StringArray::from_iter_values(metadata_json.iter().map(|s| s.as_str()));

    let flat: Vec<Option<f32>> = rows
        .iter()
        .flat_map(|r| r.vector.iter().map(|v| Some(*v)))
        .collect();
    let vectors = FixedSizeListArray::new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
        Arc::new(Float32Array::from(flat)),
        None,
    );

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(chunk_indices),
            Arc::new(contents),
            Arc::new(vectors),
            Arc::new(metadata_array),
        ],
    )
    .map_err(|e| AppError::internal(format!("arrow batch construction failed: {e}")))
}

pub struct LanceVectorIndex {
    db: lancedb::Connection,
    dimension: usize,
    tables: RwLock<HashMap<String, lancedb::Table>>,
}

impl LanceVectorIndex {
    pub async fn open(db_dir: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(db_dir)?;
        let db = lancedb::connect(db_dir).execute().await?;
        Ok(LanceVectorIndex {
            db,
            dimension,
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// `Ok(None)` means the partition doesn't exist (e.g. dropped by
    /// `delete_file`) — distinct from a genuine open/connection failure.
    async fn open_table(&self, partition: &str) -> Result<Option<lancedb::Table>> {
        if let Some(table) = self.tables.read().await.get(partition) {
            return Ok(Some(table.clone()));
        }
        match self.db.open_table(partition).execute().await {
            Ok(table) => {
                self.tables.write().await.insert(partition.to_string(), table.clone());
                Ok(Some(table))
            }
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn create_partition(&self, partition: &str, dimension: usize) -> Result<()> {
        let schema = schema_for(dimension);
        let empty = RecordBatch::new_empty(schema.clone());
        let reader = RecordBatchIterator::new(vec![Ok(empty)], schema);
        let table = self.db.create_table(partition, Box::new(reader)).execute().await?;
        self.tables.write().await.insert(partition.to_string(), table);
        Ok(())
    }

    async fn insert(&self, partition: &str, rows: Vec<VectorRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = self
            .open_table(partition)
            .await?
            .ok_or_else(|| AppError::internal(format!("insert into missing partition {partition}")))?;
        let batch = rows_to_batch(&rows, self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await?;
        Ok(())
    }

    async fn search(
        &self,
        partitions: &[String],
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let mut hits = Vec::new();
        // Tracks whether at least one partition was queried without a genuine
        // error. A missing partition (dropped by `delete_file`) counts as a
        // non-failure contributing zero hits, not a failure.
        let mut any_non_failure = false;

        for partition in partitions {
            let table = match self.open_table(partition).await {
                Ok(Some(t)) => t,
                Ok(None) => {
                    tracing::debug!(partition, "partition not found, treating as zero hits");
                    any_non_failure = true;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(partition, error = %e, "partition search failed, skipping");
                    continue;
                }
            };

            let result = table
                .query()
                .nearest_to(query_vector)
                .map_err(|e| AppError::RetrievalUnavailable(e.to_string()))?
                .limit(top_k)
                .execute()
                .await;

            let batches = match result {
                Ok(stream) => match stream.try_collect::<Vec<_>>().await {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::warn!(partition, error = %e, "vector search stream failed");
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!(partition, error = %e, "vector search failed");
                    continue;
                }
            };

            any_non_failure = true;
            let file_id = partition.strip_prefix("file_").unwrap_or(partition).to_string();

            for batch in batches {
                let chunk_indices = batch
                    .column_by_name("chunk_index")
                    .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
                let contents = batch
                    .column_by_name("content")
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>());
                let metadata_col = batch
                    .column_by_name("metadata_json")
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>());
                let distances = batch
                    .column_by_name("_distance")
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

                let (Some(chunk_indices), Some(contents)) = (chunk_indices, contents) else {
                    continue;
                };

                for i in 0..batch.num_rows() {
                    let metadata: HashMap<String, serde_json::Value> = metadata_col
                        .and_then(|m| serde_json::from_str(m.value(i)).ok())
                        .unwrap_or_default();
                    let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
                    hits.push(RetrievalHit {
                        file_id: file_id.clone(),
                        chunk_index: chunk_indices.value(i) as usize,
                        content: contents.value(i).to_string(),
                        score: 1.0 - distance,
                        metadata,
                    });
                }
            }
        }

        if !any_non_failure && !partitions.is_empty() {
            return Err(AppError::RetrievalUnavailable(
                "all partitions failed to search".to_string(),
            ));
        }

        Ok(hits)
    }

    async fn drop_partition(&self, partition: &str) -> Result<()> {
        self.tables.write().await.remove(partition);
        // `drop_table` tolerates the table not existing — delete is idempotent
        // from the caller's point of view (spec §4.1 step 7 rollback path).
        let _ = self.db.drop_table(partition).await;
        Ok(())
    }
}
