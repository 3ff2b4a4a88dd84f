//! Run request and result shapes, and the projection from final state.

use crate::state::{AgentState, Citation, QueryRound};
use chrono::{DateTime, Utc};
use research_core::AppError;
use research_llm::LlmUsage;
use serde::{Deserialize, Serialize};

/// One research question scoped to a set of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub query: String,
    pub filenames: Vec<String>,

    /// Overrides the configured retrieval budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Include the reasoning trace in the result
    #[serde(default)]
    pub include_trace: bool,
}

impl RunRequest {
    pub fn new<I, S>(query: impl Into<String>, filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query: query.into(),
            filenames: filenames.into_iter().map(Into::into).collect(),
            max_iterations: None,
            include_trace: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_trace(mut self, include_trace: bool) -> Self {
        self.include_trace = include_trace;
        self
    }
}

/// Token counts for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<LlmUsage> for TokenUsage {
    fn from(usage: LlmUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Wall-clock span of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub runtime_seconds: f64,
}

impl Runtime {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let millis = (end_time - start_time).num_milliseconds().max(0);
        Self {
            start_time,
            end_time,
            runtime_seconds: millis as f64 / 1000.0,
        }
    }

    /// Span from `start_time` until now.
    pub fn since(start_time: DateTime<Utc>) -> Self {
        Self::new(start_time, Utc::now())
    }
}

/// Externally visible outcome of a run.
///
/// `success` is true whenever an answer was produced, including the
/// not-found answer; `error` is present only when it is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub final_answer: String,
    pub citations: Vec<Citation>,
    pub iterations: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratchpad: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "searchHistory", default)]
    pub search_history: Vec<QueryRound>,

    #[serde(rename = "tokenUsage", default)]
    pub token_usage: TokenUsage,

    pub runtime: Runtime,
}

impl RunResult {
    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Project a finished state into a successful result.
pub fn format_result(state: &AgentState, include_trace: bool, runtime: Runtime) -> RunResult {
    RunResult {
        success: true,
        final_answer: state.final_answer().unwrap_or_default().to_string(),
        citations: state.citations().to_vec(),
        iterations: state.iterations(),
        scratchpad: include_trace.then(|| state.scratchpad()),
        error: None,
        search_history: state.search_history().to_vec(),
        token_usage: state.token_usage().into(),
        runtime,
    }
}

/// Project an unrecovered error into a failed result.
///
/// `state` is absent when the run never started (invalid input).
pub fn format_error(
    error: &AppError,
    state: Option<&AgentState>,
    include_trace: bool,
    runtime: Runtime,
) -> RunResult {
    RunResult {
        success: false,
        final_answer: String::new(),
        citations: Vec::new(),
        iterations: state.map(AgentState::iterations).unwrap_or(0),
        scratchpad: state.filter(|_| include_trace).map(AgentState::scratchpad),
        error: Some(error.to_string()),
        search_history: state
            .map(|s| s.search_history().to_vec())
            .unwrap_or_default(),
        token_usage: state.map(|s| s.token_usage().into()).unwrap_or_default(),
        runtime,
    }
}
