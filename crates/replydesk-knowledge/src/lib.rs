//! Knowledge indexing and retrieval for replydesk.
//!
//! Historical support emails and document chunks are embedded into a single
//! sqlite-vec index. At query time the nearest items are scored into a
//! `[0, 100]` confidence and handed to the drafting service as context.
//!
//! ```text
//! folder ──► ExtractorRegistry ──► Chunker ──┐
//!                                            ├──► KnowledgeStore ──► Retriever ──► RetrievalResult
//! seed::past_emails() ───────────────────────┘         (sqlite-vec)    (confidence)
//! ```

pub mod chunker;
pub mod confidence;
pub mod error;
pub mod extract;
pub mod retrieval;
pub mod seed;
pub mod store;
pub mod types;
pub mod vector;

pub use chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, chunk};
pub use confidence::{Badge, HIGH_THRESHOLD, MEDIUM_THRESHOLD, badge, to_confidence};
pub use error::{ExtractFailure, ExtractionError, KnowledgeError, Result};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use retrieval::{DEFAULT_TOP_K, RetrievalHit, RetrievalResult, Retriever};
pub use store::{KnowledgeStore, Neighbor};
pub use types::{
    DocumentIngestReport, EmailPair, IngestOutcome, ItemKind, KnowledgeItem, KnowledgeStats,
    SourceDocument,
};
