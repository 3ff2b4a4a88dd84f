//! Loop Controller: the bounded retrieval-and-reasoning state machine.
//!
//! ```text
//! Init -> GenerateQueries -> Retrieve -> Grade -+-> GenerateQueries
//!                                               +-> Synthesize -> Done
//!                                               +-> Fail       -> Done
//! ```
//!
//! The controller owns the run's [`AgentState`] exclusively and advances
//! it one step at a time; every step's changes go through
//! [`AgentState::apply`]. Retrieval never runs more than `max_iterations`
//! times: [`next_after_grade`] stops looping once the budget is spent and
//! the retrieve step refuses to run past it.

use crate::context::{format_previous_queries, truncate_chars};
use crate::output::{format_error, format_result, RunRequest, RunResult, Runtime};
use crate::reasoning::{GradeDecision, LlmReasoner, ReasoningGateway};
use crate::state::{AgentState, Citation, QueryRound, StateDelta, NOT_FOUND_ANSWER};
use chrono::Utc;
use research_core::config::AgentSettings;
use research_core::{AppConfig, AppError, AppResult};
use research_retrieval::{EvidenceItem, Retrieval, RetrievalGateway};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Characters of each new evidence item shown in the trace.
const TRACE_SNIPPET_CHARS: usize = 150;

const NOTHING_FOUND_NOTE: &str = "No relevant information found in the provided documents.";

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    GenerateQueries,
    Retrieve,
    Grade,
    Synthesize,
    Fail,
    Done,
}

/// Edge policy after grading.
///
/// FINISH always synthesizes, even at the cap. CONTINUE and
/// RETRY_GENERATION loop only while retrieval budget remains; otherwise the
/// run fails.
pub fn next_after_grade(decision: GradeDecision, iterations: u32, max_iterations: u32) -> Step {
    match decision {
        GradeDecision::Finish => Step::Synthesize,
        GradeDecision::Fail => Step::Fail,
        GradeDecision::Continue | GradeDecision::RetryGeneration
            if iterations < max_iterations =>
        {
            Step::GenerateQueries
        }
        GradeDecision::Continue | GradeDecision::RetryGeneration => Step::Fail,
    }
}

/// Drives research runs against injected retrieval and reasoning gateways.
///
/// Holds no per-run state, so one controller can serve concurrent runs.
pub struct Controller {
    retrieval: Arc<dyn Retrieval>,
    reasoning: Arc<dyn ReasoningGateway>,
    settings: AgentSettings,
}

impl Controller {
    pub fn new(
        retrieval: Arc<dyn Retrieval>,
        reasoning: Arc<dyn ReasoningGateway>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            retrieval,
            reasoning,
            settings,
        }
    }

    /// Wire the LanceDB-backed retrieval gateway and the configured
    /// generation provider.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let retrieval = RetrievalGateway::from_config(config).await?;
        let reasoning = LlmReasoner::from_config(config)?;
        Ok(Self::new(
            Arc::new(retrieval),
            Arc::new(reasoning),
            config.agent.clone(),
        ))
    }

    /// Run one research question to completion.
    ///
    /// Never fails: errors are reported inside the returned [`RunResult`].
    pub async fn run(&self, request: RunRequest) -> RunResult {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`Controller::run`], but stops scheduling steps once `cancel`
    /// fires. The result then reports [`AppError::Cancelled`].
    pub async fn run_with_cancel(&self, request: RunRequest, cancel: CancellationToken) -> RunResult {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("research_run", run_id = %run_id);
        self.execute(request, cancel).instrument(span).await
    }

    async fn execute(&self, request: RunRequest, cancel: CancellationToken) -> RunResult {
        let started = Utc::now();
        let include_trace = request.include_trace;

        let mut state = match self.init(&request) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Rejected run: {}", e);
                return format_error(&e, None, include_trace, Runtime::since(started));
            }
        };

        tracing::info!(
            files = state.filenames().len(),
            max_iterations = state.max_iterations(),
            "Starting research run"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.drive(&mut state) => result,
        };

        let runtime = Runtime::since(started);
        match outcome {
            Ok(()) => {
                tracing::info!(
                    iterations = state.iterations(),
                    citations = state.citations().len(),
                    tokens = state.token_usage().total_tokens,
                    "Research run finished"
                );
                format_result(&state, include_trace, runtime)
            }
            Err(e) => {
                tracing::error!(iterations = state.iterations(), "Research run failed: {}", e);
                format_error(&e, Some(&state), include_trace, runtime)
            }
        }
    }

    /// Validate the request and build the initial state.
    fn init(&self, request: &RunRequest) -> AppResult<AgentState> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("query must not be empty".to_string()));
        }

        let max_iterations = request
            .max_iterations
            .unwrap_or(self.settings.max_iterations);
        if max_iterations == 0 {
            return Err(AppError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let filenames: BTreeSet<String> = request
            .filenames
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if filenames.is_empty() {
            tracing::warn!("No filenames given; retrieval will find nothing");
        }

        Ok(AgentState::new(
            query,
            filenames,
            max_iterations,
            self.settings.max_generation_attempts,
        ))
    }

    async fn drive(&self, state: &mut AgentState) -> AppResult<()> {
        let mut step = Step::Init;
        loop {
            tracing::debug!(
                step = ?step,
                iterations = state.iterations(),
                generation_attempts = state.generation_attempts(),
                "Entering step"
            );
            step = match step {
                Step::Init => Step::GenerateQueries,
                Step::GenerateQueries => {
                    self.generate_queries(state).await?;
                    Step::Retrieve
                }
                Step::Retrieve => {
                    self.retrieve(state).await?;
                    Step::Grade
                }
                Step::Grade => self.grade(state).await,
                Step::Synthesize => {
                    self.synthesize(state).await?;
                    Step::Done
                }
                Step::Fail => {
                    self.fail(state);
                    Step::Done
                }
                Step::Done => return Ok(()),
            };
        }
    }

    async fn generate_queries(&self, state: &mut AgentState) -> AppResult<()> {
        let attempt = state.generation_attempts() + 1;
        let previous = state.previous_queries();
        let reasoned = self
            .reasoning
            .generate_queries(
                state.original_query(),
                state.retrieved_context(),
                &previous,
                attempt,
            )
            .await?;
        let queries = reasoned.value;

        tracing::info!(step = "generate_queries", attempt, queries = ?queries, "Generated search queries");

        let round = QueryRound {
            iteration: state.iterations() + 1,
            attempt,
            queries: queries.clone(),
            context_items_available: state.retrieved_context().len(),
        };
        let note = format!(
            "Generated search queries (attempt {}):\n{}",
            attempt,
            format_previous_queries(&queries)
        );
        state.apply(
            StateDelta {
                search_round: Some(round),
                search_queries: Some(queries),
                generation_attempts: Some(attempt),
                usage: reasoned.usage,
                ..Default::default()
            }
            .note(note),
        );
        Ok(())
    }

    async fn retrieve(&self, state: &mut AgentState) -> AppResult<()> {
        if state.iterations() >= state.max_iterations() {
            tracing::error!(
                iterations = state.iterations(),
                max_iterations = state.max_iterations(),
                "Retrieve scheduled past the iteration budget"
            );
            return Err(AppError::Other(format!(
                "retrieval budget of {} rounds already spent",
                state.max_iterations()
            )));
        }

        let items = self
            .retrieval
            .fetch(state.search_queries(), state.filenames())
            .await?;
        let iteration = state.iterations() + 1;

        let mut novel: Vec<EvidenceItem> = Vec::new();
        for item in items {
            if !state.filenames().contains(&item.filename) {
                tracing::error!(filename = %item.filename, "Dropping evidence outside the filename scope");
                continue;
            }
            if !state.has_evidence(&item.identity()) && !novel.contains(&item) {
                novel.push(item);
            }
        }

        tracing::info!(step = "retrieve", iteration, new_items = novel.len(), "Retrieved evidence");

        let note = retrieval_note(&novel, iteration);
        state.apply(
            StateDelta {
                new_context: novel,
                iterations: Some(iteration),
                ..Default::default()
            }
            .note(note),
        );
        Ok(())
    }

    async fn grade(&self, state: &mut AgentState) -> Step {
        let mut delta = StateDelta::default();
        let decision = match self
            .reasoning
            .grade(
                state.original_query(),
                state.retrieved_context(),
                state.iterations(),
                state.max_iterations(),
            )
            .await
        {
            Ok(reasoned) => {
                delta.usage = reasoned.usage;
                reasoned.value
            }
            Err(e) => {
                tracing::warn!("Grading failed, treating as FAIL: {}", e);
                GradeDecision::Fail
            }
        };

        let next = next_after_grade(decision, state.iterations(), state.max_iterations());
        tracing::info!(
            step = "grade",
            decision = %decision,
            iterations = state.iterations(),
            next = ?next,
            "Graded evidence"
        );

        delta = delta.note(format!("Context evaluation decision: {}", decision));

        let exhausted_strategy = decision == GradeDecision::Continue
            && next == Step::GenerateQueries
            && state.generation_attempts() >= state.max_generation_attempts();
        if decision == GradeDecision::RetryGeneration || exhausted_strategy {
            delta.generation_attempts = Some(0);
            delta = delta.note("Resetting search strategy for next iteration.");
        }
        if next == Step::Fail && decision != GradeDecision::Fail {
            tracing::info!("Retrieval budget of {} rounds spent", state.max_iterations());
        }

        state.apply(delta);
        next
    }

    async fn synthesize(&self, state: &mut AgentState) -> AppResult<()> {
        if state.retrieved_context().is_empty() {
            tracing::info!(step = "synthesize", "No evidence gathered, skipping synthesis");
            state.apply(not_found_delta());
            return Ok(());
        }

        let reasoned = match self
            .reasoning
            .synthesize(state.original_query(), state.retrieved_context())
            .await
        {
            Ok(reasoned) => reasoned,
            Err(AppError::GenerationMalformed(e)) => {
                tracing::warn!("Synthesis output unusable, returning not-found answer: {}", e);
                state.apply(not_found_delta());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let synthesis = reasoned.value;

        let (answer, citations) = if synthesis.answer.trim() == NOT_FOUND_ANSWER {
            (NOT_FOUND_ANSWER.to_string(), Vec::new())
        } else {
            let proposed = synthesis.citations.len();
            let citations = resolve_citations(synthesis.citations, state.retrieved_context());
            if citations.len() < proposed {
                tracing::warn!(
                    "Dropped {} citation(s) that do not match retrieved evidence",
                    proposed - citations.len()
                );
            }
            (synthesis.answer, citations)
        };

        tracing::info!(step = "synthesize", citations = citations.len(), "Synthesized answer");

        state.apply(
            StateDelta {
                usage: reasoned.usage,
                is_finished: Some(true),
                final_answer: Some(answer),
                citations: Some(citations),
                ..Default::default()
            }
            .note("Generating final answer..."),
        );
        Ok(())
    }

    fn fail(&self, state: &mut AgentState) {
        tracing::info!(step = "fail", iterations = state.iterations(), "Returning not-found answer");
        state.apply(not_found_delta());
    }
}

fn not_found_delta() -> StateDelta {
    StateDelta {
        is_finished: Some(true),
        final_answer: Some(NOT_FOUND_ANSWER.to_string()),
        citations: Some(Vec::new()),
        ..Default::default()
    }
    .note(NOTHING_FOUND_NOTE)
}

fn retrieval_note(novel: &[EvidenceItem], iteration: u32) -> String {
    let mut note = format!(
        "Retrieved {} new context items in iteration {}:",
        novel.len(),
        iteration
    );
    if novel.is_empty() {
        note.push_str("\nNo new relevant context found.");
    }
    for (i, item) in novel.iter().enumerate() {
        note.push_str(&format!(
            "\n[{}] Source: {}, Page: {}\nText: {}",
            i + 1,
            item.filename,
            item.page_number,
            truncate_chars(&item.text, TRACE_SNIPPET_CHARS)
        ));
    }
    note
}

/// Keep citations that point at stored evidence.
///
/// A citation resolves when an item has the same filename and page and its
/// text contains the cited text, ignoring whitespace differences. A trailing
/// truncation marker copied from the prompt context is removed first.
pub fn resolve_citations(citations: Vec<Citation>, evidence: &[EvidenceItem]) -> Vec<Citation> {
    let mut resolved: Vec<Citation> = Vec::new();
    for mut citation in citations {
        citation.text = strip_truncation_marker(&citation.text).to_string();
        let quoted = normalize_whitespace(&citation.text);
        if quoted.is_empty() || resolved.contains(&citation) {
            continue;
        }
        let found = evidence.iter().any(|item| {
            item.filename == citation.filename
                && item.page_number == citation.page
                && normalize_whitespace(&item.text).contains(&quoted)
        });
        if found {
            resolved.push(citation);
        }
    }
    resolved
}

fn strip_truncation_marker(text: &str) -> &str {
    let text = text.trim_end();
    text.strip_suffix("...")
        .or_else(|| text.strip_suffix('\u{2026}'))
        .unwrap_or(text)
        .trim_end()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBudget;

    #[test]
    fn test_finish_always_synthesizes() {
        assert_eq!(next_after_grade(GradeDecision::Finish, 1, 5), Step::Synthesize);
        assert_eq!(next_after_grade(GradeDecision::Finish, 5, 5), Step::Synthesize);
    }

    #[test]
    fn test_budget_dominates_continue_and_retry() {
        assert_eq!(next_after_grade(GradeDecision::Continue, 4, 5), Step::GenerateQueries);
        assert_eq!(
            next_after_grade(GradeDecision::RetryGeneration, 2, 5),
            Step::GenerateQueries
        );
        assert_eq!(next_after_grade(GradeDecision::Continue, 5, 5), Step::Fail);
        assert_eq!(next_after_grade(GradeDecision::RetryGeneration, 5, 5), Step::Fail);
        assert_eq!(next_after_grade(GradeDecision::Fail, 1, 5), Step::Fail);
    }

    #[test]
    fn test_resolve_citations() {
        let evidence = vec![
            EvidenceItem::new("The battery  lasts\nten hours on a charge.", "datasheet.pdf", 3),
            EvidenceItem::new("Charging takes two hours.", "datasheet.pdf", 4),
        ];
        let citations = vec![
            Citation::new("battery lasts ten hours", 3, "datasheet.pdf"),
            Citation::new("battery lasts ten hours", 3, "datasheet.pdf"),
            Citation::new("Charging takes two hours.", 3, "datasheet.pdf"),
            Citation::new("Charging takes two hours.", 4, "other.pdf"),
            Citation::new("Charging is instant.", 4, "datasheet.pdf"),
            Citation::new("   ", 4, "datasheet.pdf"),
        ];

        let resolved = resolve_citations(citations, &evidence);
        assert_eq!(
            resolved,
            vec![Citation::new("battery lasts ten hours", 3, "datasheet.pdf")]
        );
    }

    #[test]
    fn test_resolve_citations_quoting_truncated_context() {
        let long_text = format!("Replace the filter cartridge every six months. {}", "x".repeat(400));
        let evidence = vec![EvidenceItem::new(long_text.clone(), "manual.pdf", 12)];
        let shown = truncate_chars(&long_text, ContextBudget::SYNTHESIS.max_chars);

        let resolved = resolve_citations(
            vec![
                Citation::new(shown.clone(), 12, "manual.pdf"),
                Citation::new("Replace the filter cartridge\u{2026}", 12, "manual.pdf"),
            ],
            &evidence,
        );

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].text, shown.trim_end_matches("..."));
        assert_eq!(resolved[1].text, "Replace the filter cartridge");
    }

    #[test]
    fn test_retrieval_note() {
        assert_eq!(
            retrieval_note(&[], 2),
            "Retrieved 0 new context items in iteration 2:\nNo new relevant context found."
        );

        let note = retrieval_note(&[EvidenceItem::new("x".repeat(200), "a.pdf", 7)], 1);
        assert!(note.starts_with("Retrieved 1 new context items in iteration 1:\n[1] Source: a.pdf, Page: 7\nText: "));
        assert!(note.ends_with(&format!("Text: {}...", "x".repeat(150))));
    }
}
