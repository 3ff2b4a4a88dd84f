//! Vector index abstraction for document chunks.
//!
//! Defines a trait for provider-agnostic similarity search with a hard
//! filename filter.

use crate::types::{SearchFilter, SearchHit};
use research_core::AppResult;

/// Trait for vector index backends.
///
/// Implementations must apply the filter as part of the query so that
/// `top_k` counts only matching chunks, and must be safe for concurrent
/// use by independent runs.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Search for the `top_k` chunks most similar to `vector` among those
    /// whose filename passes `filter`, ordered by descending score.
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>>;

    /// Total number of chunks in the collection.
    async fn count(&self) -> AppResult<u64>;

    /// Number of chunks tagged with `filename`.
    async fn count_for_filename(&self, filename: &str) -> AppResult<u64>;

    /// Name of the underlying collection.
    fn collection(&self) -> &str;
}

/// Calculate cosine similarity between two vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
