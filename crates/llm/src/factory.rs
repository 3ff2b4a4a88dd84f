//! LLM provider factory.
//!
//! Resolves a provider name plus optional endpoint and secret into a
//! ready-to-use client.

use crate::client::LlmClient;
use crate::providers::{MockClient, OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use research_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "mock")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns a configuration error if the provider is unknown or a required
/// secret is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI provider requires API key".to_string())
            })?;
            Ok(match endpoint {
                Some(base_url) => Arc::new(OpenAiClient::with_base_url(api_key, base_url)),
                None => Arc::new(OpenAiClient::new(api_key)),
            })
        }
        ProviderType::Mock => Ok(Arc::new(MockClient::new())),
    }
}

/// Create the generation client selected by the application config.
pub fn create_client_from_config(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    let provider_config = config.get_provider_config(&config.provider);
    let endpoint = provider_config.as_ref().and_then(|p| p.endpoint());
    let api_key = config.resolve_api_key(&config.provider);

    tracing::debug!(provider = %config.provider, model = %config.model, "Creating LLM client");
    create_client(&config.provider, endpoint, api_key.as_deref())
}
