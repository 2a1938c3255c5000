//! Domain services.
//!
//! [`DomainServices`] is built once at process start and handed to every
//! command; nothing here is global.

pub mod draft;
pub mod send;

use std::path::Path;
use std::sync::Arc;

use replydesk_knowledge::{DocumentIngestReport, IngestOutcome, KnowledgeStore, Retriever, seed};
use replydesk_llm::SharedBackend;
use replydesk_mail::SharedTransport;
use replydesk_tracker::FollowUpTracker;
use tracing::{info, warn};

use crate::error::Result;

pub use draft::{DraftOptions, DraftReply, DraftService};
pub use send::{SendOutcome, SendService};

/// Result of startup ingestion.
#[derive(Debug)]
pub struct SeedReport {
    /// `None` when the built-in corpus was not requested.
    pub emails: Option<IngestOutcome>,
    pub documents: DocumentIngestReport,
    /// Seeding was skipped because the index belongs to another embedder.
    pub stale: bool,
}

/// Load the built-in email corpus and a documents folder into `store`.
///
/// Both steps skip when their kind is already indexed, so this is safe to
/// run on every start. A stale store is left untouched until it is reset.
pub async fn seed_knowledge(
    store: &KnowledgeStore,
    include_emails: bool,
    docs_dir: Option<&Path>,
) -> Result<SeedReport> {
    if store.is_stale() {
        warn!("Knowledge index is stale, skipping seeding");
        return Ok(SeedReport {
            emails: None,
            documents: DocumentIngestReport::default(),
            stale: true,
        });
    }

    let emails = if include_emails {
        let pairs = seed::past_emails()?;
        Some(store.ingest_emails(&pairs).await?)
    } else {
        None
    };
    let documents = match docs_dir {
        Some(dir) => store.ingest_folder(dir).await?,
        None => DocumentIngestReport::default(),
    };
    Ok(SeedReport {
        emails,
        documents,
        stale: false,
    })
}

/// Domain services facade.
#[derive(Clone)]
pub struct DomainServices {
    knowledge: Arc<KnowledgeStore>,
    tracker: Arc<FollowUpTracker>,
    draft: DraftService,
    send: Option<SendService>,
}

impl DomainServices {
    /// Create services over opened stores. Sending is unavailable until a
    /// transport is attached with [`with_transport`](Self::with_transport).
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        tracker: Arc<FollowUpTracker>,
        backend: SharedBackend,
        options: DraftOptions,
        top_k: usize,
    ) -> Self {
        info!(backend = backend.name(), top_k, "Initializing domain services");
        let retriever = Retriever::new(knowledge.clone()).with_top_k(top_k);
        let draft = DraftService::new(retriever, backend, options);
        Self {
            knowledge,
            tracker,
            draft,
            send: None,
        }
    }

    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        info!(transport = transport.name(), "Mail transport attached");
        self.send = Some(SendService::new(transport, self.tracker.clone()));
        self
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    pub fn tracker(&self) -> &Arc<FollowUpTracker> {
        &self.tracker
    }

    pub fn draft(&self) -> &DraftService {
        &self.draft
    }

    pub fn retriever(&self) -> &Retriever {
        self.draft.retriever()
    }

    /// The send workflow, if a transport is attached.
    pub fn send(&self) -> Option<&SendService> {
        self.send.as_ref()
    }
}
