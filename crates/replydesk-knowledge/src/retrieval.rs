//! Retrieval pipeline: store query plus confidence scoring.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::confidence::{Badge, MEDIUM_THRESHOLD, to_confidence};
use crate::error::Result;
use crate::store::KnowledgeStore;
use crate::types::KnowledgeItem;

/// Default number of hits per query.
pub const DEFAULT_TOP_K: usize = 5;

/// One retrieved item with its distance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub item: KnowledgeItem,
    pub distance: f32,
    /// `[0, 100]`, one decimal place.
    pub confidence: f32,
}

impl RetrievalHit {
    pub fn badge(&self) -> Badge {
        Badge::for_score(self.confidence)
    }

    /// Prompt context entry: `[KIND | Source: src | Confidence: c%]` then the text.
    pub fn context_entry(&self) -> String {
        format!(
            "[{} | Source: {} | Confidence: {:.1}%]\n{}",
            self.item.kind.label(),
            self.item.source,
            self.confidence,
            self.item.text
        )
    }
}

/// Hits for one query, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Confidence of the nearest hit, or 0 when nothing was retrieved.
    pub fn top_confidence(&self) -> f32 {
        self.hits.first().map_or(0.0, |h| h.confidence)
    }

    /// All context entries joined by blank lines. Empty when there are no hits.
    pub fn context_block(&self) -> String {
        self.hits
            .iter()
            .map(RetrievalHit::context_entry)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievalHit> {
        self.hits.iter()
    }
}

/// Runs queries against a shared [`KnowledgeStore`].
#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve(&self, email: &str) -> Result<RetrievalResult> {
        self.retrieve_top(email, self.top_k).await
    }

    /// Retrieve up to `top_k` hits, preserving the store's ordering.
    pub async fn retrieve_top(&self, email: &str, top_k: usize) -> Result<RetrievalResult> {
        let neighbors = self.store.query(email, top_k).await?;
        let hits: Vec<RetrievalHit> = neighbors
            .into_iter()
            .map(|n| RetrievalHit {
                confidence: to_confidence(n.distance),
                distance: n.distance,
                item: n.item,
            })
            .collect();
        let result = RetrievalResult { hits };

        let top = result.top_confidence();
        if !result.is_empty() && top < MEDIUM_THRESHOLD {
            warn!(top_confidence = top, hits = result.len(), "Low-confidence retrieval");
        } else {
            debug!(top_confidence = top, hits = result.len(), "Retrieved context");
        }
        Ok(result)
    }
}
