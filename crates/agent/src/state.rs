//! Evidence store for one research run.
//!
//! [`AgentState`] is created once per run and only ever changes through
//! [`AgentState::apply`]. Each step of the controller produces a
//! [`StateDelta`]; list fields in the delta are appended, scalar fields
//! overwrite.

use research_llm::LlmUsage;
use research_retrieval::{EvidenceId, EvidenceItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Fixed answer for questions the documents cannot answer.
pub const NOT_FOUND_ANSWER: &str = "Information not found in provided documents";

/// A piece of evidence the final answer relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub page: i64,
    pub filename: String,
}

impl Citation {
    pub fn new(text: impl Into<String>, page: i64, filename: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page,
            filename: filename.into(),
        }
    }
}

/// Queries issued in one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRound {
    /// Retrieval round the queries were generated for (1-based)
    pub iteration: u32,

    /// Generation attempt within the current strategy (1-based)
    pub attempt: u32,

    pub queries: Vec<String>,

    /// Evidence items already stored when the queries were generated
    pub context_items_available: usize,
}

/// State changes produced by one controller step.
///
/// Append fields: `new_context`, `search_round`, `scratchpad`, `usage`
/// (added to the running total). Overwrite fields: everything wrapped in
/// `Option`.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub new_context: Vec<EvidenceItem>,
    pub search_round: Option<QueryRound>,
    pub scratchpad: Vec<String>,
    pub usage: LlmUsage,

    pub search_queries: Option<Vec<String>>,
    pub iterations: Option<u32>,
    pub generation_attempts: Option<u32>,
    pub is_finished: Option<bool>,
    pub final_answer: Option<String>,
    pub citations: Option<Vec<Citation>>,
}

impl StateDelta {
    pub fn note(mut self, entry: impl Into<String>) -> Self {
        self.scratchpad.push(entry.into());
        self
    }
}

/// Everything known about a run: the question, its document scope, the
/// evidence gathered so far and the loop counters.
#[derive(Debug, Clone)]
pub struct AgentState {
    original_query: String,
    filenames: BTreeSet<String>,
    retrieved_context: Vec<EvidenceItem>,
    evidence_ids: HashSet<EvidenceId>,
    search_queries: Vec<String>,
    search_history: Vec<QueryRound>,
    iterations: u32,
    max_iterations: u32,
    generation_attempts: u32,
    max_generation_attempts: u32,
    is_finished: bool,
    final_answer: Option<String>,
    citations: Vec<Citation>,
    scratchpad: Vec<String>,
    token_usage: LlmUsage,
}

impl AgentState {
    /// Fresh state with zeroed counters and empty lists.
    pub fn new(
        original_query: impl Into<String>,
        filenames: BTreeSet<String>,
        max_iterations: u32,
        max_generation_attempts: u32,
    ) -> Self {
        Self {
            original_query: original_query.into(),
            filenames,
            retrieved_context: Vec::new(),
            evidence_ids: HashSet::new(),
            search_queries: Vec::new(),
            search_history: Vec::new(),
            iterations: 0,
            max_iterations: max_iterations.max(1),
            generation_attempts: 0,
            max_generation_attempts: max_generation_attempts.max(1),
            is_finished: false,
            final_answer: None,
            citations: Vec::new(),
            scratchpad: Vec::new(),
            token_usage: LlmUsage::default(),
        }
    }

    /// Merge a step's delta into the state.
    ///
    /// Returns how many evidence items were actually new.
    pub fn apply(&mut self, delta: StateDelta) -> usize {
        let mut appended = 0;
        for item in delta.new_context {
            if self.evidence_ids.insert(item.identity()) {
                self.retrieved_context.push(item);
                appended += 1;
            }
        }
        self.search_history.extend(delta.search_round);
        self.scratchpad.extend(delta.scratchpad);
        self.token_usage.add(delta.usage);

        if let Some(queries) = delta.search_queries {
            self.search_queries = queries;
        }
        if let Some(iterations) = delta.iterations {
            self.iterations = iterations;
        }
        if let Some(attempts) = delta.generation_attempts {
            self.generation_attempts = attempts;
        }
        if let Some(finished) = delta.is_finished {
            self.is_finished = finished;
        }
        if let Some(answer) = delta.final_answer {
            self.final_answer = Some(answer);
        }
        if let Some(citations) = delta.citations {
            self.citations = citations;
        }

        if self.final_answer.as_deref() == Some(NOT_FOUND_ANSWER) {
            self.citations.clear();
        }

        appended
    }

    /// Whether an item with this identity is already stored.
    pub fn has_evidence(&self, id: &EvidenceId) -> bool {
        self.evidence_ids.contains(id)
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn filenames(&self) -> &BTreeSet<String> {
        &self.filenames
    }

    pub fn retrieved_context(&self) -> &[EvidenceItem] {
        &self.retrieved_context
    }

    pub fn search_queries(&self) -> &[String] {
        &self.search_queries
    }

    pub fn search_history(&self) -> &[QueryRound] {
        &self.search_history
    }

    /// Every query issued so far, oldest first.
    pub fn previous_queries(&self) -> Vec<String> {
        self.search_history
            .iter()
            .flat_map(|round| round.queries.iter().cloned())
            .collect()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn generation_attempts(&self) -> u32 {
        self.generation_attempts
    }

    pub fn max_generation_attempts(&self) -> u32 {
        self.max_generation_attempts
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    /// Tokens spent by every generation call of the run.
    pub fn token_usage(&self) -> LlmUsage {
        self.token_usage
    }

    /// Reasoning trace, one blank line between entries.
    pub fn scratchpad(&self) -> String {
        self.scratchpad.join("\n\n")
    }
}
