//! Prompt system for the research agent.
//!
//! This crate provides structured prompt management with:
//! - YAML prompt definitions carrying their response schema
//! - Built-in definitions for query generation, grading and synthesis
//! - Per-workspace overrides under `.research/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{
    builtin_prompt, list_prompts, load_prompt, resolve_prompt, GRADE_PROMPT_ID, QUERY_PROMPT_ID,
    SYNTHESIS_PROMPT_ID,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptOutputSpec};
