//! Error types for Docent.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! request validation, the upstream services the pipeline talks to
//! (embedding service, vector datastore, generative model), session
//! persistence and cancellation.

use thiserror::Error;

/// Unified error type for Docent.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client-correctable request errors (empty or oversized question, bad body)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Embedding service errors other than rate limiting
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector datastore errors
    #[error("Datastore error: {0}")]
    Datastore(String),

    /// Generative model errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Retrieval returned no candidates for the question
    #[error("No candidate passages found for the question")]
    NoCandidates,

    /// Session store errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The request was cancelled or ran past its deadline
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error originates from an external service the pipeline depends on.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::Embedding(_) | AppError::Datastore(_) | AppError::Llm(_)
        )
    }

    /// Message that is safe to show to the caller.
    ///
    /// Upstream and internal causes are replaced by a generic retry hint;
    /// the original error is expected to be logged by the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NoCandidates => {
                "I couldn't find enough relevant sources to answer that question.".to_string()
            }
            AppError::Cancelled(_) => "The request was cancelled before it completed.".to_string(),
            _ => "Something went wrong while answering. Please try again.".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        assert!(AppError::Embedding("down".to_string()).is_upstream());
        assert!(AppError::Datastore("refused".to_string()).is_upstream());
        assert!(AppError::Llm("500".to_string()).is_upstream());
        assert!(!AppError::NoCandidates.is_upstream());
        assert!(!AppError::Validation("empty".to_string()).is_upstream());
    }

    #[test]
    fn test_public_message_hides_upstream_cause() {
        let err = AppError::Datastore("password authentication failed for user docent".to_string());
        let message = err.public_message();
        assert!(!message.contains("password"));
        assert!(message.contains("try again"));
    }

    #[test]
    fn test_public_message_keeps_validation_detail() {
        let err = AppError::Validation("Question must not be empty".to_string());
        assert_eq!(err.public_message(), "Question must not be empty");
    }
}
