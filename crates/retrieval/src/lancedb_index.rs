//! LanceDB-backed vector index.
//!
//! The collection is a table with `text`, `filename`, `page_number` and a
//! fixed-size `vector` column. The filename filter is pushed into the query
//! as an SQL predicate so LanceDB prefilters before taking the top K.

use crate::types::{IndexRecord, SearchFilter, SearchHit};
use crate::vector_index::VectorIndex;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use research_core::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;

/// LanceDB-backed vector index over pre-ingested document chunks.
pub struct LanceDbIndex {
    table: Table,
    collection: String,
    dimensions: usize,
}

impl LanceDbIndex {
    /// Open an existing collection.
    ///
    /// # Errors
    /// * `RetrievalUnavailable` - the database cannot be opened
    /// * `CollectionNotFound` - the table does not exist
    pub async fn open(db_path: &Path, collection: &str) -> AppResult<Self> {
        let conn = connect(db_path).await?;

        if !table_exists(&conn, collection).await? {
            return Err(AppError::CollectionNotFound(format!(
                "'{}' in {:?}",
                collection, db_path
            )));
        }

        let table = conn
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| index_error("Failed to open table", e))?;

        let dimensions = vector_dimensions(&table).await?;
        tracing::debug!(
            collection,
            dimensions,
            "Opened LanceDB collection at {:?}",
            db_path
        );

        Ok(Self {
            table,
            collection: collection.to_string(),
            dimensions,
        })
    }

    /// Create (or reopen) a collection with the chunk schema.
    pub async fn create(db_path: &Path, collection: &str, dimensions: usize) -> AppResult<Self> {
        std::fs::create_dir_all(db_path)?;
        let conn = connect(db_path).await?;

        let table = if table_exists(&conn, collection).await? {
            conn.open_table(collection)
                .execute()
                .await
                .map_err(|e| index_error("Failed to open table", e))?
        } else {
            let schema = chunk_schema(dimensions);
            let empty_batch = RecordBatch::new_empty(schema.clone());

            conn.create_table(
                collection,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema),
            )
            .execute()
            .await
            .map_err(|e| index_error("Failed to create table", e))?
        };

        tracing::debug!(collection, dimensions, "Initialized LanceDB collection");

        Ok(Self {
            table,
            collection: collection.to_string(),
            dimensions,
        })
    }

    /// Append chunk records in a single write.
    pub async fn add(&self, records: &[IndexRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();

        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| index_error("Failed to add chunks", e))?;

        tracing::debug!("Inserted {} chunks into '{}'", records.len(), self.collection);
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn records_to_batch(&self, records: &[IndexRecord]) -> AppResult<RecordBatch> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimensions) {
            return Err(AppError::InvalidInput(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.vector.len()
            )));
        }

        let texts = StringArray::from_iter_values(records.iter().map(|r| r.text.as_str()));
        let filenames = StringArray::from_iter_values(records.iter().map(|r| r.filename.as_str()));
        let pages = Int64Array::from_iter_values(records.iter().map(|r| r.page_number));

        let values = Float32Array::from_iter_values(
            records.iter().flat_map(|r| r.vector.iter().copied()),
        );
        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimensions as i32,
            Arc::new(values),
            None,
        )
        .map_err(|e| AppError::Other(format!("Failed to build vector column: {}", e)))?;

        RecordBatch::try_new(
            chunk_schema(self.dimensions),
            vec![
                Arc::new(texts),
                Arc::new(filenames),
                Arc::new(pages),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| AppError::Other(format!("Failed to create RecordBatch: {}", e)))
    }
}

#[async_trait::async_trait]
impl VectorIndex for LanceDbIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        if vector.len() != self.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        let predicate = filename_predicate(filter);
        tracing::debug!(%predicate, top_k, "LanceDB filtered search");

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(predicate)
            .nearest_to(vector.to_vec())
            .map_err(|e| index_error("Failed to create query", e))?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| index_error("Failed to execute search", e))?
            .try_collect()
            .await
            .map_err(|e| index_error("Failed to collect results", e))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(batch_to_hits(batch)?);
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    async fn count(&self) -> AppResult<u64> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| index_error("Failed to count rows", e))?;
        Ok(count as u64)
    }

    async fn count_for_filename(&self, filename: &str) -> AppResult<u64> {
        let count = self
            .table
            .count_rows(Some(format!("filename = {}", sql_literal(filename))))
            .await
            .map_err(|e| index_error("Failed to count rows", e))?;
        Ok(count as u64)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

async fn connect(db_path: &Path) -> AppResult<Connection> {
    let uri = db_path.to_string_lossy().to_string();
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| index_error("Failed to connect to LanceDB", e))
}

async fn table_exists(conn: &Connection, collection: &str) -> AppResult<bool> {
    let table_names = conn
        .table_names()
        .execute()
        .await
        .map_err(|e| index_error("Failed to list tables", e))?;
    Ok(table_names.iter().any(|name| name == collection))
}

async fn vector_dimensions(table: &Table) -> AppResult<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| index_error("Failed to read table schema", e))?;

    match schema.field_with_name("vector").map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, size)) => Ok(*size as usize),
        _ => Err(AppError::Config(
            "Collection has no fixed-size 'vector' column".to_string(),
        )),
    }
}

fn chunk_schema(dimensions: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("text", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("page_number", DataType::Int64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimensions as i32,
            ),
            false,
        ),
    ]))
}

fn batch_to_hits(batch: &RecordBatch) -> AppResult<Vec<SearchHit>> {
    let texts = string_column(batch, "text")?;
    let filenames = string_column(batch, "filename")?;
    let pages = batch
        .column_by_name("page_number")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| AppError::Other("Invalid page_number column".to_string()))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| AppError::Other("Missing _distance column".to_string()))?;

    Ok((0..batch.num_rows())
        .map(|row| SearchHit {
            text: texts.value(row).to_string(),
            filename: filenames.value(row).to_string(),
            page_number: pages.value(row),
            // Cosine distance is 1 - similarity.
            score: 1.0 - distances.value(row),
        })
        .collect())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Other(format!("Invalid {} column", name)))
}

/// `filename IN ('a', 'b')` for a non-empty filter.
fn filename_predicate(filter: &SearchFilter) -> String {
    let literals: Vec<String> = filter.filenames.iter().map(|f| sql_literal(f)).collect();
    format!("filename IN ({})", literals.join(", "))
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Only failures that may clear up on their own are transient; a missing
/// table or a rejected query is reported as such and never retried.
fn index_error(context: &str, err: lancedb::Error) -> AppError {
    let message = format!("{}: {}", context, err);
    match err {
        lancedb::Error::TableNotFound { .. } | lancedb::Error::DatabaseNotFound { .. } => {
            AppError::CollectionNotFound(message)
        }
        lancedb::Error::InvalidInput { .. }
        | lancedb::Error::InvalidTableName { .. }
        | lancedb::Error::Schema { .. }
        | lancedb::Error::NotSupported { .. }
        | lancedb::Error::Arrow { .. } => AppError::Other(message),
        _ => AppError::RetrievalUnavailable(message),
    }
}
