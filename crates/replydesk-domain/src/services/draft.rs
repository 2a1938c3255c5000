//! Reply drafting service.
//!
//! Retrieval, prompt assembly, one completion call, then post-processing.

use std::collections::BTreeSet;
use std::time::Duration;

use replydesk_knowledge::{MEDIUM_THRESHOLD, RetrievalResult, Retriever};
use replydesk_llm::{CompletionRequest, SharedBackend};
use tracing::{debug, info, warn};

use crate::error::{CompletionError, Result};
use crate::reply;

/// Default completion model.
pub const DEFAULT_DRAFT_MODEL: &str = "llama-3.3-70b-versatile";

/// Completion settings for drafting.
#[derive(Debug, Clone)]
pub struct DraftOptions {
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound on one completion call.
    pub timeout: Duration,
}

impl Default for DraftOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_DRAFT_MODEL.to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A generated reply with the context it was grounded on.
#[derive(Debug, Clone)]
pub struct DraftReply {
    /// Reply text, subject lines removed. Callers may edit it before sending.
    pub body: String,
    pub context: RetrievalResult,
    pub top_confidence: f32,
    /// Addresses parsed from `cc:` lines of the body.
    pub cc: BTreeSet<String>,
}

impl DraftReply {
    /// True when the best context match is below the medium tier.
    pub fn low_confidence(&self) -> bool {
        self.top_confidence < MEDIUM_THRESHOLD
    }
}

/// Drafts replies from retrieved knowledge.
#[derive(Clone)]
pub struct DraftService {
    retriever: Retriever,
    backend: SharedBackend,
    options: DraftOptions,
}

impl DraftService {
    pub fn new(retriever: Retriever, backend: SharedBackend, options: DraftOptions) -> Self {
        Self {
            retriever,
            backend,
            options,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn options(&self) -> &DraftOptions {
        &self.options
    }

    /// Draft a reply to `email`.
    ///
    /// A failed, timed-out or blank completion is an error; no partial draft
    /// is returned.
    pub async fn draft(&self, email: &str) -> Result<DraftReply> {
        let context = self.retriever.retrieve(email).await?;
        let prompt = reply::build_prompt(&context.context_block(), email);
        debug!(
            hits = context.len(),
            prompt_len = prompt.len(),
            backend = self.backend.name(),
            "Requesting draft"
        );

        let text = self.complete(prompt).await?;
        let body = reply::strip_subject_lines(&text);
        if body.is_empty() {
            warn!("Completion contained only subject lines");
            return Err(CompletionError::EmptyResponse.into());
        }

        let cc = reply::extract_cc(&body);
        let top_confidence = context.top_confidence();
        info!(
            hits = context.len(),
            top_confidence,
            cc = cc.len(),
            "Draft generated"
        );

        Ok(DraftReply {
            body,
            context,
            top_confidence,
            cc,
        })
    }

    async fn complete(&self, prompt: String) -> std::result::Result<String, CompletionError> {
        let request =
            CompletionRequest::single_turn(&self.options.model, prompt, self.options.max_tokens);

        let response = match tokio::time::timeout(self.options.timeout, self.backend.complete(request)).await {
            Err(_) => {
                warn!(timeout_secs = self.options.timeout.as_secs(), "Completion timed out");
                return Err(CompletionError::TimedOut(self.options.timeout));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Completion failed");
                return Err(CompletionError::Backend(e));
            }
            Ok(Ok(response)) => response,
        };

        if response.is_blank() {
            warn!(model = %response.model, "Completion returned no text");
            return Err(CompletionError::EmptyResponse);
        }
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use replydesk_knowledge::{EmailPair, KnowledgeStore};
    use replydesk_llm::{LlmError, MockBackend, MockEmbedder, MockResponse};
    use std::sync::Arc;

    fn empty_retriever() -> Retriever {
        let store = KnowledgeStore::open_in_memory(Arc::new(MockEmbedder::new(16))).unwrap();
        Retriever::new(Arc::new(store))
    }

    fn service(retriever: Retriever, backend: Arc<MockBackend>) -> DraftService {
        DraftService::new(retriever, backend, DraftOptions::default())
    }

    #[tokio::test]
    async fn test_empty_store_still_drafts() {
        let backend = Arc::new(MockBackend::with_text("Subject: Re: XYZ\nHi,\n\nWe are checking."));
        let drafts = service(empty_retriever(), backend.clone());

        let draft = drafts.draft("transfer failing partner XYZ").await.unwrap();
        assert!(draft.context.is_empty());
        assert_eq!(draft.top_confidence, 0.0);
        assert!(draft.low_confidence());
        assert_eq!(draft.body, "Hi,\n\nWe are checking.");

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let prompt = requests[0].last_user_text().unwrap();
        assert!(!prompt.contains("RETRIEVED CONTEXT"));
        assert!(prompt.contains("transfer failing partner XYZ"));
    }

    #[tokio::test]
    async fn test_context_in_prompt() {
        let store = KnowledgeStore::open_in_memory(Arc::new(MockEmbedder::new(16))).unwrap();
        let pair = EmailPair::new("Password reset for SFTP user", "Needs JO approval.");
        store.ingest_emails(&[pair.clone()]).await.unwrap();
        let retriever = Retriever::new(Arc::new(store));

        let backend = Arc::new(MockBackend::with_text("Hi,\nCC: jo@example.com\nThanks"));
        let draft = service(retriever, backend.clone())
            .draft(&pair.to_text())
            .await
            .unwrap();

        assert_eq!(draft.context.len(), 1);
        assert_eq!(draft.top_confidence, 100.0);
        assert!(!draft.low_confidence());
        assert_eq!(draft.cc, BTreeSet::from(["jo@example.com".to_string()]));

        let prompt = backend.requests()[0].last_user_text().unwrap().to_string();
        assert!(prompt.contains("[EMAIL | Source: past_emails | Confidence: 100.0%]"));
    }

    #[tokio::test]
    async fn test_backend_error_is_completion_error() {
        let backend = Arc::new(MockBackend::with_error(LlmError::Network("down".into())));
        let err = service(empty_retriever(), backend)
            .draft("help")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Completion(CompletionError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_response_is_error() {
        let backend = Arc::new(MockBackend::with_text("   \n"));
        let err = service(empty_retriever(), backend)
            .draft("help")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Completion(CompletionError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_subject_only_response_is_error() {
        let backend = Arc::new(MockBackend::with_text("Subject: Re: help"));
        let err = service(empty_retriever(), backend)
            .draft("help")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Completion(CompletionError::EmptyResponse)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Delayed(
            Duration::from_secs(120),
            "late".into(),
        )]));
        let options = DraftOptions {
            timeout: Duration::from_secs(5),
            ..DraftOptions::default()
        };
        let err = DraftService::new(empty_retriever(), backend, options)
            .draft("help")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Completion(CompletionError::TimedOut(d)) if d == Duration::from_secs(5)
        ));
    }
}
