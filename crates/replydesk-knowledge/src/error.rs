//! Error types for the knowledge crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the knowledge crate.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding the text failed.
    #[error("Embedding error: {0}")]
    Embedding(#[from] replydesk_llm::LlmError),

    /// Chunk size and overlap would not advance through the text.
    #[error("Invalid chunking: size={size}, overlap={overlap} (overlap must be smaller than size)")]
    InvalidChunking { size: usize, overlap: usize },

    /// The embedder produced vectors of a different width than the index.
    #[error("Embedding dimension mismatch: index has {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Stored embeddings were built with a different embedder.
    #[error(
        "Knowledge index is stale (built with {stored_provider}, {stored_dims} dimensions); reset it before ingesting"
    )]
    StaleIndex {
        stored_dims: usize,
        stored_provider: String,
    },

    /// Filesystem error while opening the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document folder could not be listed.
    #[error("Failed to read folder {path}: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for knowledge operations.
pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Why a single document could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractFailure {
    #[error("not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("unreadable archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry {0} is missing")]
    MissingEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("extractor disabled: {0}")]
    Disabled(&'static str),
}

/// One file that could not be extracted during ingestion.
///
/// These are collected into the ingestion report rather than aborting the run.
#[derive(Debug, Error)]
#[error("{filename}: {source}")]
pub struct ExtractionError {
    pub filename: String,
    #[source]
    pub source: ExtractFailure,
}

impl ExtractionError {
    pub fn new(filename: impl Into<String>, source: ExtractFailure) -> Self {
        Self {
            filename: filename.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_display_names_file() {
        let err = ExtractionError::new("guide.docx", ExtractFailure::MissingEntry("word/document.xml".into()));
        assert_eq!(
            err.to_string(),
            "guide.docx: archive entry word/document.xml is missing"
        );
    }

    #[test]
    fn test_invalid_chunking_message() {
        let err = KnowledgeError::InvalidChunking { size: 50, overlap: 50 };
        assert!(err.to_string().contains("overlap must be smaller than size"));
    }
}
