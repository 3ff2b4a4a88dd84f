//! Deterministic offline provider.
//!
//! Answers structured requests by inspecting the schema's required fields,
//! which is enough to drive a full research run without a model server.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use research_core::AppResult;
use serde_json::{json, Value};

/// Mock LLM client.
#[derive(Debug, Default, Clone)]
pub struct MockClient;

impl MockClient {
    pub fn new() -> Self {
        Self
    }

    fn respond(&self, request: &LlmRequest) -> Value {
        let required: Vec<&str> = request
            .response_schema
            .as_ref()
            .and_then(|schema| schema.get("required"))
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if required.contains(&"queries") {
            json!({ "queries": [question_line(&request.prompt)] })
        } else if required.contains(&"decision") {
            json!({ "decision": "FINISH" })
        } else if required.contains(&"answer") {
            json!({
                "answer": format!("Mock answer for: {}", question_line(&request.prompt)),
                "citations": []
            })
        } else {
            Value::String(question_line(&request.prompt))
        }
    }
}

/// The line following a `Question:` marker, or the first non-empty line.
fn question_line(prompt: &str) -> String {
    let mut lines = prompt.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = prompt
        .lines()
        .find_map(|l| l.trim().strip_prefix("Question:").map(str::trim))
        .filter(|l| !l.is_empty())
        .or_else(|| lines.next())
        .unwrap_or("");
    line.chars().take(100).collect()
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = match self.respond(request) {
            Value::String(text) => text,
            value => value.to_string(),
        };
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(prompt_tokens, completion_tokens),
            done: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(field: &str) -> Value {
        json!({ "type": "object", "required": [field] })
    }

    #[tokio::test]
    async fn test_mock_answers_by_required_field() {
        let client = MockClient::new();
        let prompt = "Generate search queries.\nQuestion: How do I reset the router?\n";

        let queries = client
            .complete(&LlmRequest::new(prompt, "mock").with_schema(schema("queries")))
            .await
            .unwrap();
        let value: Value = queries.parse_json().unwrap();
        assert_eq!(value["queries"][0], "How do I reset the router?");

        let decision = client
            .complete(&LlmRequest::new(prompt, "mock").with_schema(schema("decision")))
            .await
            .unwrap();
        let value: Value = decision.parse_json().unwrap();
        assert_eq!(value["decision"], "FINISH");
    }
}
