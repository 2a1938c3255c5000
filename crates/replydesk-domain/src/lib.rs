//! Domain facade for replydesk.
//!
//! Sits between the CLI and the infrastructure crates:
//!
//! - **Drafting**: retrieve context, build the prompt, call the completion
//!   backend, strip subject lines and collect CC addresses
//! - **Sending**: deliver through the mail transport, mark the source read,
//!   open a follow-up with an SLA deadline
//!
//! # Example
//!
//! ```ignore
//! use replydesk_domain::{DomainServices, DraftOptions, seed_knowledge};
//!
//! seed_knowledge(&knowledge, true, Some(&docs_dir)).await?;
//! let services = DomainServices::new(knowledge, tracker, backend, DraftOptions::default(), 5)
//!     .with_transport(graph);
//!
//! let draft = services.draft().draft(&message.drafting_input()).await?;
//! if let Some(sender) = services.send() {
//!     sender.send(&message, &draft.body, Priority::P3).await?;
//! }
//! ```

mod error;
pub mod reply;
pub mod services;

pub use error::{CompletionError, DomainError, Result};
pub use reply::{build_prompt, extract_cc, strip_subject_lines, summarize};
pub use services::draft::{DEFAULT_DRAFT_MODEL, DraftOptions, DraftReply, DraftService};
pub use services::send::{SendOutcome, SendService};
pub use services::{DomainServices, SeedReport, seed_knowledge};
