//! Retrieval layer for the research agent.
//!
//! Turns keyword queries into filtered similarity searches against a
//! pre-populated vector index and returns deduplicated evidence items.
//!
//! - [`EvidenceItem`] / [`SearchFilter`]: evidence and the hard filename scope
//! - [`VectorIndex`]: LanceDB ([`LanceDbIndex`]) or in-memory ([`MemoryIndex`]) backends
//! - [`EmbeddingProvider`]: mock, Ollama and OpenAI query embedders
//! - [`EmbeddingCache`]: SQLite cache of query vectors
//! - [`RetrievalGateway`]: the [`Retrieval`] implementation used by the agent

pub mod cache;
pub mod embeddings;
pub mod gateway;
pub mod lancedb_index;
pub mod memory_index;
pub mod types;
pub mod vector_index;

pub use cache::EmbeddingCache;
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use gateway::{Retrieval, RetrievalGateway};
pub use lancedb_index::LanceDbIndex;
pub use memory_index::MemoryIndex;
pub use types::{
    CollectionReport, EvidenceId, EvidenceItem, FileCoverage, IndexRecord, SearchFilter, SearchHit,
};
pub use vector_index::VectorIndex;
