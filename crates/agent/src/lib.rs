//! Document research agent.
//!
//! Answers a question from a fixed set of documents by looping over query
//! generation, filtered retrieval and evidence grading under a strict
//! round budget, then synthesizes a cited answer or reports
//! [`NOT_FOUND_ANSWER`].
//!
//! # Example
//! ```no_run
//! use research_agent::{Controller, RunRequest};
//! use research_core::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let controller = Controller::from_config(&config).await?;
//! let result = controller
//!     .run(RunRequest::new("What does the warranty cover?", ["warranty.pdf"]))
//!     .await;
//! println!("{}", result.final_answer);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod controller;
pub mod output;
pub mod reasoning;
pub mod state;

pub use controller::{next_after_grade, resolve_citations, Controller, Step};
pub use output::{format_error, format_result, RunRequest, RunResult, Runtime, TokenUsage};
pub use reasoning::{
    GradeDecision, LlmReasoner, Reasoned, ReasoningGateway, ReasoningPrompts, Synthesis,
};
pub use state::{AgentState, Citation, QueryRound, StateDelta, NOT_FOUND_ANSWER};
