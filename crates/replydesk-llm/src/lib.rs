//! Completion and embedding clients for replydesk.
//!
//! ```text
//! ┌─────────────────────────────┐   ┌──────────────────────────────┐
//! │  LlmBackend trait           │   │  Embedder trait              │
//! │  - complete() -> Response   │   │  - embed() / embed_batch()   │
//! └─────────────────────────────┘   └──────────────────────────────┘
//!          │                                  │
//!     ┌────┴──────┐                 ┌─────────┼──────────┐
//!     ▼           ▼                 ▼         ▼          ▼
//! ┌────────┐ ┌────────┐         ┌──────┐ ┌────────┐ ┌───────┐
//! │ OpenAI │ │  Mock  │         │ Mock │ │ OpenAI │ │ Local │
//! │ (Groq) │ └────────┘         └──────┘ └────────┘ └───────┘
//! └────────┘
//! ```

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};

pub use embeddings::{
    Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    build_embedder,
};

pub use openai::{OpenAiBackend, OpenAiConfig};

#[cfg(feature = "local-embeddings")]
pub use embeddings::local::LocalEmbedder;
