//! LLM client abstraction and request/response types.

use research_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the LLM
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// JSON schema the response must conform to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

impl LlmRequest {
    /// Create a new LLM request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
            response_schema: None,
        }
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Constrain the response to a JSON schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,
}

fn default_true() -> bool {
    true
}

impl LlmResponse {
    /// Parse the content as JSON, tolerating a surrounding markdown fence.
    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        let trimmed = strip_code_fence(&self.content);
        serde_json::from_str(trimmed).map_err(|e| {
            AppError::GenerationMalformed(format!("response is not valid JSON for schema: {}", e))
        })
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another call's usage.
    pub fn add(&mut self, other: LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Trait for LLM providers.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "openai").
    fn provider_name(&self) -> &str;

    /// Perform a single completion.
    ///
    /// Connection failures, timeouts and 5xx/429 responses surface as
    /// [`AppError::GenerationUnavailable`] so callers can retry them.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

/// Map an HTTP send failure to the transient generation error.
pub(crate) fn send_error(provider: &str, err: reqwest::Error) -> AppError {
    AppError::GenerationUnavailable(format!("Failed to send request to {}: {}", provider, err))
}

/// Map a non-success HTTP status to an error, transient for 5xx and 429.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: String) -> AppError {
    let message = format!("{} API error ({}): {}", provider, status, body);
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AppError::GenerationUnavailable(message)
    } else {
        AppError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model: "test".to_string(),
            usage: LlmUsage::default(),
            done: true,
        }
    }

    #[test]
    fn test_parse_json_plain_and_fenced() {
        #[derive(Deserialize)]
        struct Decision {
            decision: String,
        }

        let plain: Decision = response(r#"{"decision":"FINISH"}"#).parse_json().unwrap();
        assert_eq!(plain.decision, "FINISH");

        let fenced: Decision = response("```json\n{\"decision\":\"CONTINUE\"}\n```")
            .parse_json()
            .unwrap();
        assert_eq!(fenced.decision, "CONTINUE");
    }

    #[test]
    fn test_parse_json_malformed() {
        let result: AppResult<serde_json::Value> = response("I think we should finish.").parse_json();
        assert!(matches!(result, Err(AppError::GenerationMalformed(_))));
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = LlmUsage::default();
        total.add(LlmUsage::new(120, 30));
        total.add(LlmUsage::new(80, 20));
        assert_eq!(total, LlmUsage::new(200, 50));
    }

    #[test]
    fn test_status_error_classification() {
        let transient = status_error("Ollama", reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(transient.is_transient());

        let permanent = status_error("OpenAI", reqwest::StatusCode::UNAUTHORIZED, String::new());
        assert!(!permanent.is_transient());
    }
}
