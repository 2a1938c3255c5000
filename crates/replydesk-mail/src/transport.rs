//! The mail transport boundary.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{InboxMessage, SendReceipt};

/// Fetch, reply to, and mark inbox messages.
///
/// With a non-empty `cc`, `send_reply` must go through create-draft, patch,
/// send; the direct-reply path cannot carry CC recipients. That sequence is
/// not atomic: a failure after the draft exists is reported as
/// [`MailError::OrphanDraft`](crate::MailError::OrphanDraft) and the draft is
/// left in place.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Newest unread messages first, at most `max_count`.
    async fn fetch_unread(&self, max_count: usize) -> Result<Vec<InboxMessage>>;

    async fn send_reply(
        &self,
        message_id: &str,
        body: &str,
        cc: &BTreeSet<String>,
    ) -> Result<SendReceipt>;

    async fn mark_read(&self, message_id: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// A transport that can be shared across threads.
pub type SharedTransport = Arc<dyn MailTransport>;
