//! Retrieval Gateway: queries in, deduplicated filtered evidence out.

use crate::cache::EmbeddingCache;
use crate::embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
use crate::lancedb_index::LanceDbIndex;
use crate::types::{CollectionReport, EvidenceItem, FileCoverage, SearchFilter};
use crate::vector_index::VectorIndex;
use research_core::{retry_transient, AppConfig, AppError, AppResult, RetryPolicy};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Evidence source consumed by the loop controller.
#[async_trait::async_trait]
pub trait Retrieval: Send + Sync {
    /// Fetch evidence for one round of queries, restricted to `filenames`.
    ///
    /// Returns an empty list (not an error) when nothing matches.
    async fn fetch(
        &self,
        queries: &[String],
        filenames: &BTreeSet<String>,
    ) -> AppResult<Vec<EvidenceItem>>;
}

/// Embeds queries and runs filtered similarity search against a vector index.
pub struct RetrievalGateway {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    cache: Option<Arc<EmbeddingCache>>,
    top_k: usize,
    retry: RetryPolicy,
}

impl RetrievalGateway {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            cache: None,
            top_k: 5,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the gateway described by the application config: LanceDB
    /// collection, configured embedder and (optionally) the SQLite cache.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let retry = config.retry.policy();
        let index_path = config.index_path();
        let collection = config.index.collection.clone();

        let index = retry_transient(
            &retry,
            "open vector index",
            AppError::RetrievalUnavailable,
            || LanceDbIndex::open(&index_path, &collection),
        )
        .await?;

        let embedding_config = EmbeddingConfig::from_app_config(config);
        let api_key = config.resolve_api_key(&embedding_config.provider);
        let embedder = create_provider(&embedding_config, api_key.as_deref())?;

        if embedder.dimensions() != index.dimensions() {
            return Err(AppError::Config(format!(
                "Embedding model '{}' produces {} dimensions but collection '{}' stores {}",
                embedder.model_name(),
                embedder.dimensions(),
                collection,
                index.dimensions()
            )));
        }

        let mut gateway = Self::new(embedder, Arc::new(index))
            .with_top_k(config.index.top_k)
            .with_retry(retry);

        if config.index.cache_embeddings {
            let ttl = Duration::from_secs(config.index.cache_ttl_secs);
            match EmbeddingCache::open(&config.embedding_cache_path(), ttl) {
                Ok(cache) => {
                    if let Err(e) = cache.purge_expired() {
                        tracing::warn!("Failed to purge embedding cache: {}", e);
                    }
                    gateway = gateway.with_cache(Arc::new(cache));
                }
                Err(e) => tracing::warn!("Embedding cache disabled: {}", e),
            }
        }

        Ok(gateway)
    }

    /// Report chunk counts for the collection and each requested filename.
    pub async fn check(&self, filenames: &BTreeSet<String>) -> AppResult<CollectionReport> {
        let total_chunks = retry_transient(
            &self.retry,
            "count chunks",
            AppError::RetrievalUnavailable,
            || self.index.count(),
        )
        .await?;

        let mut files = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let chunks = retry_transient(
                &self.retry,
                "count chunks for file",
                AppError::RetrievalUnavailable,
                || self.index.count_for_filename(filename),
            )
            .await?;
            files.push(FileCoverage {
                filename: filename.clone(),
                chunks,
            });
        }

        Ok(CollectionReport {
            collection: self.index.collection().to_string(),
            total_chunks,
            files,
        })
    }

    async fn query_vector(&self, query: &str) -> AppResult<Vec<f32>> {
        let model = self.embedder.model_name();

        if let Some(cache) = &self.cache {
            match cache.get(model, query) {
                Ok(Some(vector)) => {
                    tracing::debug!(query, "Embedding cache hit");
                    return Ok(vector);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Embedding cache read failed: {}", e),
            }
        }

        let vector = retry_transient(
            &self.retry,
            "embed query",
            AppError::RetrievalUnavailable,
            || self.embedder.embed(query),
        )
        .await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(model, query, &vector) {
                tracing::warn!("Embedding cache write failed: {}", e);
            }
        }

        Ok(vector)
    }
}

#[async_trait::async_trait]
impl Retrieval for RetrievalGateway {
    async fn fetch(
        &self,
        queries: &[String],
        filenames: &BTreeSet<String>,
    ) -> AppResult<Vec<EvidenceItem>> {
        let filter = SearchFilter {
            filenames: filenames.clone(),
        };

        if filter.is_empty() {
            tracing::debug!("Empty filename filter; nothing can match");
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut evidence = Vec::new();

        for query in queries.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
            let vector = self.query_vector(query).await?;

            let hits = retry_transient(
                &self.retry,
                "similarity search",
                AppError::RetrievalUnavailable,
                || self.index.search(&vector, &filter, self.top_k),
            )
            .await?;

            tracing::debug!(query, hits = hits.len(), "Search completed");

            for hit in hits {
                if !filter.matches(&hit.filename) {
                    tracing::error!(
                        filename = %hit.filename,
                        "Index returned a chunk outside the filename filter; dropping it"
                    );
                    continue;
                }

                let item = EvidenceItem::from(hit);
                if seen.insert(item.identity()) {
                    evidence.push(item);
                }
            }
        }

        Ok(evidence)
    }
}
