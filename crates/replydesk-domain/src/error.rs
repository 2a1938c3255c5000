//! Domain error types.

use std::time::Duration;

use thiserror::Error;

/// The completion call produced no usable draft.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The backend returned an error.
    #[error("Completion backend failed: {0}")]
    Backend(#[from] replydesk_llm::LlmError),

    /// No response within the configured timeout.
    #[error("Completion timed out after {0:?}")]
    TimedOut(Duration),

    /// The backend answered with no text.
    #[error("Completion returned an empty reply")]
    EmptyResponse,
}

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Knowledge store or retrieval failure.
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] replydesk_knowledge::KnowledgeError),

    /// Draft generation failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Mail transport failure.
    #[error("Mail error: {0}")]
    Mail(#[from] replydesk_mail::MailError),

    /// Follow-up tracker failure.
    #[error("Tracker error: {0}")]
    Tracker(#[from] replydesk_tracker::TrackerError),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
