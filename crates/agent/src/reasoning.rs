//! Reasoning Gateway: query generation, evidence grading and synthesis.
//!
//! Every call renders a prompt definition, asks the generation service for
//! output constrained by the definition's JSON schema and validates the
//! reply into a typed value. Transient service failures are retried through
//! [`retry_transient`]; replies that fail validation are re-requested up to
//! `malformed_retries` times before [`AppError::GenerationMalformed`] is
//! returned.

use crate::context::{
    clean_queries, fit_to_token_budget, format_context, format_previous_queries, ContextBudget,
    SYNTHESIS_TOKEN_BUDGET,
};
use crate::state::{Citation, NOT_FOUND_ANSWER};
use research_core::config::AgentSettings;
use research_core::{retry_transient, AppConfig, AppError, AppResult, RetryPolicy};
use research_llm::{create_client_from_config, LlmClient, LlmRequest, LlmUsage};
use research_prompt::{
    build_prompt, builtin_prompt, resolve_prompt, PromptDefinition, GRADE_PROMPT_ID,
    QUERY_PROMPT_ID, SYNTHESIS_PROMPT_ID,
};
use research_retrieval::EvidenceItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Outcome of grading the evidence gathered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeDecision {
    /// Evidence is sufficient
    Finish,
    /// More evidence needed, same strategy
    Continue,
    /// More evidence needed, new query strategy
    RetryGeneration,
    /// Evidence judged unobtainable
    Fail,
}

impl GradeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeDecision::Finish => "FINISH",
            GradeDecision::Continue => "CONTINUE",
            GradeDecision::RetryGeneration => "RETRY_GENERATION",
            GradeDecision::Fail => "FAIL",
        }
    }
}

impl fmt::Display for GradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer and supporting citations produced by synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl Synthesis {
    pub fn not_found() -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            citations: Vec::new(),
        }
    }
}

/// A reasoning result together with the tokens spent producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reasoned<T> {
    pub value: T,
    pub usage: LlmUsage,
}

impl<T> Reasoned<T> {
    /// Result with no recorded usage.
    pub fn new(value: T) -> Self {
        Self {
            value,
            usage: LlmUsage::default(),
        }
    }

    pub fn with_usage(value: T, usage: LlmUsage) -> Self {
        Self { value, usage }
    }
}

/// The three judgement calls the loop controller delegates.
#[async_trait::async_trait]
pub trait ReasoningGateway: Send + Sync {
    /// Produce 1+ short search phrases, avoiding `previous_queries`.
    async fn generate_queries(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
        previous_queries: &[String],
        attempt: u32,
    ) -> AppResult<Reasoned<Vec<String>>>;

    /// Judge whether the evidence suffices, given the remaining budget.
    async fn grade(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
        iterations: u32,
        max_iterations: u32,
    ) -> AppResult<Reasoned<GradeDecision>>;

    /// Answer from `context` only, or return [`NOT_FOUND_ANSWER`].
    async fn synthesize(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
    ) -> AppResult<Reasoned<Synthesis>>;
}

/// Prompt definitions used by [`LlmReasoner`].
#[derive(Debug, Clone)]
pub struct ReasoningPrompts {
    pub queries: PromptDefinition,
    pub grade: PromptDefinition,
    pub synthesize: PromptDefinition,
}

impl ReasoningPrompts {
    /// Definitions bundled with the crate.
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            queries: builtin_prompt(QUERY_PROMPT_ID)?,
            grade: builtin_prompt(GRADE_PROMPT_ID)?,
            synthesize: builtin_prompt(SYNTHESIS_PROMPT_ID)?,
        })
    }

    /// Workspace overrides where present, built-ins otherwise.
    pub fn resolve(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            queries: resolve_prompt(workspace, QUERY_PROMPT_ID)?,
            grade: resolve_prompt(workspace, GRADE_PROMPT_ID)?,
            synthesize: resolve_prompt(workspace, SYNTHESIS_PROMPT_ID)?,
        })
    }
}

#[derive(Deserialize)]
struct QueriesReply {
    queries: Vec<String>,
}

#[derive(Deserialize)]
struct GradeReply {
    decision: GradeDecision,
}

/// [`ReasoningGateway`] backed by an [`LlmClient`].
pub struct LlmReasoner {
    client: Arc<dyn LlmClient>,
    model: String,
    prompts: ReasoningPrompts,
    settings: AgentSettings,
    retry: RetryPolicy,
    temperature: f32,
}

impl LlmReasoner {
    /// Reasoner using the built-in prompts and default settings.
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            client,
            model: model.into(),
            prompts: ReasoningPrompts::builtin()?,
            settings: AgentSettings::default(),
            retry: RetryPolicy::default(),
            temperature: 0.0,
        })
    }

    pub fn with_prompts(mut self, prompts: ReasoningPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the reasoner selected by the application config.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = create_client_from_config(config)?;
        Ok(Self::new(client, config.model.clone())?
            .with_prompts(ReasoningPrompts::resolve(&config.workspace)?)
            .with_settings(config.agent.clone())
            .with_retry(config.retry.policy()))
    }

    /// Render `definition`, call the model and validate the reply.
    ///
    /// `validate` turns the parsed reply into the final value; an error from
    /// it counts as malformed output.
    async fn call<R, T>(
        &self,
        definition: &PromptDefinition,
        variables: HashMap<String, String>,
        validate: impl Fn(R) -> AppResult<T> + Send,
    ) -> AppResult<Reasoned<T>>
    where
        R: DeserializeOwned,
    {
        let built = build_prompt(definition, variables)?;
        let mut request =
            LlmRequest::new(built.user, self.model.clone()).with_temperature(self.temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(schema) = built.schema {
            request = request.with_schema(schema);
        }

        let operation = format!("generation '{}'", definition.id);
        let mut usage = LlmUsage::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let response = retry_transient(
                &self.retry,
                &operation,
                AppError::GenerationUnavailable,
                || self.client.complete(&request),
            )
            .await?;
            usage.add(response.usage);

            match response.parse_json::<R>().and_then(&validate) {
                Ok(value) => {
                    tracing::debug!(
                        prompt = %definition.id,
                        tokens = response.usage.total_tokens,
                        "Generation succeeded"
                    );
                    return Ok(Reasoned::with_usage(value, usage));
                }
                Err(e) if attempt <= self.settings.malformed_retries => {
                    tracing::warn!(
                        "{} returned malformed output (attempt {}/{}), asking again: {}",
                        operation,
                        attempt,
                        self.settings.malformed_retries + 1,
                        e
                    );
                }
                Err(e) => {
                    tracing::error!("{} kept returning malformed output: {}", operation, e);
                    return Err(match e {
                        AppError::GenerationMalformed(_) => e,
                        other => AppError::GenerationMalformed(other.to_string()),
                    });
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ReasoningGateway for LlmReasoner {
    async fn generate_queries(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
        previous_queries: &[String],
        attempt: u32,
    ) -> AppResult<Reasoned<Vec<String>>> {
        let mut vars = HashMap::new();
        vars.insert("originalQuery".to_string(), original_query.to_string());
        vars.insert(
            "previousQueries".to_string(),
            format_previous_queries(previous_queries),
        );
        vars.insert(
            "context".to_string(),
            format_context(context, ContextBudget::QUERIES),
        );
        vars.insert("maxQueries".to_string(), self.settings.max_queries.to_string());
        vars.insert("attempt".to_string(), attempt.to_string());

        let max_queries = self.settings.max_queries;
        let max_length = self.settings.max_query_length;
        let mut reasoned = self
            .call(&self.prompts.queries, vars, |reply: QueriesReply| {
                Ok(clean_queries(reply.queries, previous_queries, max_queries, max_length))
            })
            .await?;

        if reasoned.value.is_empty() {
            tracing::warn!("Model produced no usable queries, searching with the question itself");
            reasoned.value = clean_queries(
                vec![original_query.to_string()],
                &[],
                max_queries,
                max_length,
            );
        }
        Ok(reasoned)
    }

    async fn grade(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
        iterations: u32,
        max_iterations: u32,
    ) -> AppResult<Reasoned<GradeDecision>> {
        let mut vars = HashMap::new();
        vars.insert("originalQuery".to_string(), original_query.to_string());
        vars.insert("iterations".to_string(), iterations.to_string());
        vars.insert("maxIterations".to_string(), max_iterations.to_string());
        vars.insert(
            "remaining".to_string(),
            max_iterations.saturating_sub(iterations).to_string(),
        );
        vars.insert(
            "context".to_string(),
            format_context(context, ContextBudget::GRADE),
        );

        self.call(&self.prompts.grade, vars, |reply: GradeReply| Ok(reply.decision))
            .await
    }

    async fn synthesize(
        &self,
        original_query: &str,
        context: &[EvidenceItem],
    ) -> AppResult<Reasoned<Synthesis>> {
        if context.is_empty() {
            return Ok(Reasoned::new(Synthesis::not_found()));
        }

        let fitted = fit_to_token_budget(context, SYNTHESIS_TOKEN_BUDGET);
        if fitted.len() < context.len() {
            tracing::warn!(
                "Context trimmed from {} to {} items to fit the synthesis token budget",
                context.len(),
                fitted.len()
            );
        }

        let mut vars = HashMap::new();
        vars.insert("originalQuery".to_string(), original_query.to_string());
        vars.insert(
            "context".to_string(),
            format_context(fitted, ContextBudget::SYNTHESIS),
        );
        vars.insert("notFoundAnswer".to_string(), NOT_FOUND_ANSWER.to_string());

        self.call(&self.prompts.synthesize, vars, |reply: Synthesis| {
            let answer = reply.answer.trim();
            if answer.is_empty() {
                return Err(AppError::GenerationMalformed(
                    "synthesis returned an empty answer".to_string(),
                ));
            }
            if answer == NOT_FOUND_ANSWER {
                return Ok(Synthesis::not_found());
            }
            Ok(Synthesis {
                answer: answer.to_string(),
                citations: reply.citations,
            })
        })
        .await
    }
}
