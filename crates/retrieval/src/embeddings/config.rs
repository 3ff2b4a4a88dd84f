//! Embedding configuration.

use research_core::config::ProviderConfig;
use research_core::AppConfig;
use serde::{Deserialize, Serialize};

/// Settings for the query embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "mock", "ollama", "openai"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Custom endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Derive embedding settings from the application config.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let endpoint = config
            .get_provider_config(&config.index.embedding_provider)
            .and_then(|p| match p {
                ProviderConfig::Ollama { endpoint, .. } => Some(endpoint),
                ProviderConfig::OpenAI { endpoint, .. } => endpoint,
            });

        Self {
            provider: config.index.embedding_provider.clone(),
            model: config.index.embedding_model.clone(),
            dimensions: config.index.dimensions,
            endpoint,
        }
    }
}
