//! Core types for the knowledge store.

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Items
// ─────────────────────────────────────────────────────────────────────────────

/// The two partitions of the knowledge index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A historical query/reply pair.
    Email,
    /// A window of words cut from a document.
    DocChunk,
}

impl ItemKind {
    /// Value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::DocChunk => "doc",
        }
    }

    /// Upper-case label used in prompt context headers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::DocChunk => "DOC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "doc" => Some(Self::DocChunk),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of indexed knowledge.
///
/// Items are created once at ingestion and never mutated; the only way to
/// remove them is a full reset of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Stable id, unique across both kinds (`email_{i}` / `chunk_{n}`).
    pub id: String,
    pub text: String,
    pub kind: ItemKind,
    /// `past_emails` for seeded emails, the file name for document chunks.
    pub source: String,
}

impl KnowledgeItem {
    /// Source label used for every seeded email.
    pub const EMAIL_SOURCE: &'static str = "past_emails";

    pub fn email(index: usize, pair: &EmailPair) -> Self {
        Self {
            id: format!("email_{index}"),
            text: pair.to_text(),
            kind: ItemKind::Email,
            source: Self::EMAIL_SOURCE.to_string(),
        }
    }

    pub fn doc_chunk(number: usize, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: format!("chunk_{number}"),
            text: text.into(),
            kind: ItemKind::DocChunk,
            source: source.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingestion Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// A historical support question and the reply that resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPair {
    pub query: String,
    pub reply: String,
}

impl EmailPair {
    pub fn new(query: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reply: reply.into(),
        }
    }

    /// The text that gets embedded and stored.
    pub fn to_text(&self) -> String {
        format!("Query: {}\nReply: {}", self.query, self.reply)
    }
}

/// A raw file from the document folder.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingestion Results
// ─────────────────────────────────────────────────────────────────────────────

/// What an idempotent ingestion call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "count", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Nothing of this kind existed; this many items were inserted.
    Inserted(usize),
    /// Items of this kind already existed; nothing was written.
    AlreadyPresent(usize),
}

impl IngestOutcome {
    /// Number of items of this kind in the store after the call.
    pub fn count(&self) -> usize {
        match self {
            Self::Inserted(n) | Self::AlreadyPresent(n) => *n,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, Self::AlreadyPresent(_))
    }
}

/// Result of loading a folder of documents.
#[derive(Debug, Default)]
pub struct DocumentIngestReport {
    /// Files that produced at least one chunk.
    pub files: usize,
    /// Chunks inserted by this call.
    pub chunks: usize,
    /// Set when document chunks were already present and the call was a no-op.
    pub already_present: Option<usize>,
    /// Files whose text could not be extracted.
    pub warnings: Vec<ExtractionError>,
}

impl DocumentIngestReport {
    /// Chunk count in the store after the call.
    pub fn total_chunks(&self) -> usize {
        self.already_present.unwrap_or(self.chunks)
    }
}

/// Counters for the `ingest`/`stats` surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeStats {
    pub emails: usize,
    pub doc_chunks: usize,
    pub embeddings: usize,
    pub dimensions: usize,
    pub provider: String,
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_item_text_and_id() {
        let pair = EmailPair::new("Transfer failed", "Reset the credentials");
        let item = KnowledgeItem::email(3, &pair);
        assert_eq!(item.id, "email_3");
        assert_eq!(item.text, "Query: Transfer failed\nReply: Reset the credentials");
        assert_eq!(item.kind, ItemKind::Email);
        assert_eq!(item.source, "past_emails");
    }

    #[test]
    fn test_kind_round_trip_and_labels() {
        for kind in [ItemKind::Email, ItemKind::DocChunk] {
            assert_eq!(ItemKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::DocChunk.label(), "DOC");
        assert_eq!(ItemKind::parse("note"), None);
    }

    #[test]
    fn test_source_document_extension() {
        assert_eq!(SourceDocument::new("Runbook.DOCX", vec![]).extension().as_deref(), Some("docx"));
        assert_eq!(SourceDocument::new("README", vec![]).extension(), None);
    }

    #[test]
    fn test_report_total_chunks() {
        let report = DocumentIngestReport {
            already_present: Some(12),
            ..Default::default()
        };
        assert_eq!(report.total_chunks(), 12);
        assert_eq!(IngestOutcome::AlreadyPresent(4).count(), 4);
        assert!(!IngestOutcome::Inserted(4).was_skipped());
    }
}
