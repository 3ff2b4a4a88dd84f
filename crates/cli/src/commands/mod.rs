//! Command handlers for the research CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod check;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use check::CheckCommand;
