//! In-process vector index for tests and small corpora.

use crate::types::{IndexRecord, SearchFilter, SearchHit};
use crate::vector_index::{cosine_similarity, VectorIndex};
use research_core::{AppError, AppResult};
use std::sync::RwLock;

/// Brute-force cosine index held in memory.
#[derive(Debug)]
pub struct MemoryIndex {
    collection: String,
    dimensions: usize,
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryIndex {
    pub fn new(collection: impl Into<String>, dimensions: usize) -> Self {
        Self {
            collection: collection.into(),
            dimensions,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Append records; every vector must match the index dimensions.
    pub fn add(&self, records: Vec<IndexRecord>) -> AppResult<()> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimensions) {
            return Err(AppError::InvalidInput(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.vector.len()
            )));
        }

        self.records
            .write()
            .map_err(|_| AppError::Other("memory index lock poisoned".to_string()))?
            .extend(records);
        Ok(())
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, Vec<IndexRecord>>> {
        self.records
            .read()
            .map_err(|_| AppError::Other("memory index lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        if vector.len() != self.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        let records = self.read()?;
        let mut hits: Vec<SearchHit> = records
            .iter()
            .filter(|r| filter.matches(&r.filename))
            .map(|r| SearchHit {
                text: r.text.clone(),
                filename: r.filename.clone(),
                page_number: r.page_number,
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.read()?.len() as u64)
    }

    async fn count_for_filename(&self, filename: &str) -> AppResult<u64> {
        Ok(self.read()?.iter().filter(|r| r.filename == filename).count() as u64)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
