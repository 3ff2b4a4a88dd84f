//! Error types for the document research agent.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! input validation, the retrieval and generation services, prompt
//! rendering and run cancellation.

use thiserror::Error;

/// Unified error type for the document research agent.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied an unusable query or filename set
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector index or embedding service unreachable (transient)
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Target index collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Generation service unreachable or timed out (transient)
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generation response did not match the expected structured shape
    #[error("Malformed generation output: {0}")]
    GenerationMalformed(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller abandoned the run
    #[error("Run cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the owning gateway may retry the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RetrievalUnavailable(_) | AppError::GenerationUnavailable(_)
        )
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Config",
            AppError::Io(_) => "Io",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::RetrievalUnavailable(_) => "RetrievalUnavailable",
            AppError::CollectionNotFound(_) => "CollectionNotFound",
            AppError::GenerationUnavailable(_) => "GenerationUnavailable",
            AppError::GenerationMalformed(_) => "GenerationMalformed",
            AppError::Prompt(_) => "Prompt",
            AppError::Serialization(_) => "Serialization",
            AppError::Cancelled => "Cancelled",
            AppError::Other(_) => "Other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
