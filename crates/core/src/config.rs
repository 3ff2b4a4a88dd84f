//! Configuration management for the document research agent.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.research/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources override earlier ones.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

/// Providers the factories know how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "openai", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .research/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "openai")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Explicit API key override
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Provider table from config.yaml
    pub llm: Option<LlmSection>,

    /// Vector index settings
    pub index: IndexSettings,

    /// Loop controller settings
    pub agent: AgentSettings,

    /// Retry and timeout settings for external calls
    pub retry: RetrySettings,
}

/// LLM provider table from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider")]
    pub active_embedding_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Generation model for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    /// Embedding model for this provider, if configured.
    pub fn embedding_model(&self) -> Option<&str> {
        match self {
            Self::OpenAI {
                embedding_model, ..
            }
            | Self::Ollama {
                embedding_model, ..
            } => embedding_model.as_deref(),
        }
    }

    /// Custom endpoint, if configured.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::OpenAI { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Where the pre-populated vector index lives and how to query it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    /// LanceDB database directory (relative paths resolve against the workspace)
    pub path: PathBuf,

    /// Table holding the document chunks
    pub collection: String,

    /// Embedding provider used to vectorize search queries
    pub embedding_provider: String,

    /// Embedding model used to vectorize search queries
    pub embedding_model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Hits requested per search query
    pub top_k: usize,

    /// Cache query embeddings in SQLite across runs
    pub cache_embeddings: bool,

    /// Embedding cache time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".research/index"),
            collection: "document_chunks".to_string(),
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            dimensions: 768,
            top_k: 5,
            cache_embeddings: true,
            cache_ttl_secs: 86_400,
        }
    }
}

/// Budgets for the retrieval-and-reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// Retrieval rounds allowed per run
    pub max_iterations: u32,

    /// Query-generation attempts before the strategy is reset
    pub max_generation_attempts: u32,

    /// Search queries kept per generation
    pub max_queries: usize,

    /// Characters kept per search query
    pub max_query_length: usize,

    /// Re-asks allowed when generation output fails validation
    pub malformed_retries: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_generation_attempts: 3,
            max_queries: 3,
            max_query_length: 100,
            malformed_retries: 2,
        }
    }
}

/// Serializable form of [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            call_timeout_secs: policy.call_timeout.as_secs(),
        }
    }
}

impl RetrySettings {
    /// Build the runtime retry policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    index: Option<IndexSettings>,
    agent: Option<AgentSettings>,
    retry: Option<RetrySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            json_logs: false,
            verbose: false,
            no_color: false,
            llm: None,
            index: IndexSettings::default(),
            agent: AgentSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and the environment.
    ///
    /// Environment variables:
    /// - `RESEARCH_WORKSPACE`: Override workspace path
    /// - `RESEARCH_CONFIG`: Path to config file
    /// - `RESEARCH_PROVIDER`: Generation provider
    /// - `RESEARCH_MODEL`: Generation model
    /// - `RESEARCH_API_KEY`: API key
    /// - `RESEARCH_INDEX_PATH`: LanceDB directory
    /// - `RESEARCH_COLLECTION`: Index table name
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RESEARCH_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RESEARCH_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.research_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RESEARCH_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RESEARCH_MODEL") {
            config.model = model;
        }

        if let Ok(path) = std::env::var("RESEARCH_INDEX_PATH") {
            config.index.path = PathBuf::from(path);
        }

        if let Ok(collection) = std::env::var("RESEARCH_COLLECTION") {
            config.index.collection = collection;
        }

        config.api_key = std::env::var("RESEARCH_API_KEY").ok();

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.json_logs = format.eq_ignore_ascii_case("json");
            }
        }

        if let Some(index) = config_file.index {
            result.index = index;
        }

        if let Some(agent) = config_file.agent {
            result.agent = agent;
        }

        if let Some(retry) = config_file.retry {
            result.retry = retry;
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            if let Some(embedding_config) = llm.providers.get(&llm.active_embedding_provider) {
                result.index.embedding_provider = llm.active_embedding_provider.clone();
                if let Some(model) = embedding_config.embedding_model() {
                    result.index.embedding_model = model.to_string();
                }
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .research directory.
    pub fn research_dir(&self) -> PathBuf {
        self.workspace.join(".research")
    }

    /// Resolved LanceDB directory.
    pub fn index_path(&self) -> PathBuf {
        if self.index.path.is_absolute() {
            self.index.path.clone()
        } else {
            self.workspace.join(&self.index.path)
        }
    }

    /// SQLite file backing the query embedding cache.
    pub fn embedding_cache_path(&self) -> PathBuf {
        self.research_dir().join("embedding_cache.sqlite")
    }

    /// Get the configuration for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve the API key for a provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if provider == "openai" => std::env::var("OPENAI_API_KEY").ok(),
            None => None,
        }
    }

    /// Validate configuration before a run.
    pub fn validate(&self) -> AppResult<()> {
        for (role, provider) in [
            ("generation", self.provider.as_str()),
            ("embedding", self.index.embedding_provider.as_str()),
        ] {
            if !KNOWN_PROVIDERS.contains(&provider) {
                return Err(AppError::Config(format!(
                    "Unknown {} provider: {}. Supported: {}",
                    role,
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }

            if provider == "openai" && self.resolve_api_key(provider).is_none() {
                return Err(AppError::Config(format!(
                    "API key not found for {} provider 'openai'",
                    role
                )));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(AppError::Config(
                "agent.maxIterations must be greater than 0".to_string(),
            ));
        }

        if self.agent.max_generation_attempts == 0 {
            return Err(AppError::Config(
                "agent.maxGenerationAttempts must be greater than 0".to_string(),
            ));
        }

        if self.index.top_k == 0 {
            return Err(AppError::Config(
                "index.topK must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.max_generation_attempts, 3);
        assert_eq!(config.index.collection, "document_chunks");
        assert_eq!(config.index.top_k, 5);
        assert!(!config.verbose);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4o".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  activeEmbeddingProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: qwen2.5
      embeddingModel: mxbai-embed-large
index:
  path: data/lance
  collection: manuals
  embeddingProvider: ollama
  embeddingModel: nomic-embed-text
  dimensions: 1024
  topK: 8
  cacheEmbeddings: false
  cacheTtlSecs: 60
agent:
  maxIterations: 7
  maxGenerationAttempts: 2
  maxQueries: 4
  maxQueryLength: 80
  malformedRetries: 1
logging:
  level: warn
  color: false
  format: json
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.index.collection, "manuals");
        assert_eq!(config.index.embedding_model, "mxbai-embed-large");
        assert_eq!(config.index.top_k, 8);
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.no_color);
        assert!(config.json_logs);
    }

    #[test]
    fn test_index_path_resolves_against_workspace() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/srv/research");
        assert_eq!(
            config.index_path(),
            PathBuf::from("/srv/research/.research/index")
        );

        config.index.path = PathBuf::from("/data/lance");
        assert_eq!(config.index_path(), PathBuf::from("/data/lance"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_budget() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_settings_policy() {
        let settings = RetrySettings {
            max_attempts: 4,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
            call_timeout_secs: 15,
        };
        let policy = settings.policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.call_timeout, Duration::from_secs(15));
    }
}
