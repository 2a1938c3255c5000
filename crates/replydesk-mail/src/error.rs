//! Error types for the mail transport.

use crate::types::SendStage;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, MailError>;

/// Errors that can occur talking to the mailbox provider.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The provider answered with an unexpected status code.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// A CC reply draft was created but never sent.
    ///
    /// The draft stays in the mailbox and has to be reconciled by hand.
    #[error("Reply draft {draft_id} left unsent after {stage} failed: {source}")]
    OrphanDraft {
        draft_id: String,
        stage: SendStage,
        #[source]
        source: Box<MailError>,
    },

    /// Sign-in failed or was refused.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// No stored tokens.
    #[error("Not signed in. Run `replydesk auth login` first.")]
    NotSignedIn,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Token file I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailError {
    /// Draft id of a partially completed CC send, if this is one.
    pub fn orphan_draft_id(&self) -> Option<&str> {
        match self {
            MailError::OrphanDraft { draft_id, .. } => Some(draft_id),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MailError {
    fn from(e: reqwest::Error) -> Self {
        MailError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for MailError {
    fn from(e: serde_json::Error) -> Self {
        MailError::Serialization(e.to_string())
    }
}
