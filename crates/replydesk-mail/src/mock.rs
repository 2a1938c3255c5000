//! In-memory transport for tests and offline runs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{MailError, Result};
use crate::transport::MailTransport;
use crate::types::{InboxMessage, SendReceipt, SendStage};

/// A call observed by [`MockMailTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailCall {
    FetchUnread {
        max_count: usize,
    },
    DirectReply {
        message_id: String,
        body: String,
    },
    CreateReply {
        message_id: String,
    },
    PatchDraft {
        draft_id: String,
        body: String,
        cc: BTreeSet<String>,
    },
    SendDraft {
        draft_id: String,
    },
    MarkRead {
        message_id: String,
    },
}

/// Failure to inject into the next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The reply call itself fails; nothing was created.
    Rejected,
    /// A CC draft is created, then the given stage fails.
    AfterDraft(SendStage),
}

/// Records every call and mimics the provider's routing rules.
#[derive(Debug, Default)]
pub struct MockMailTransport {
    inbox: Mutex<Vec<InboxMessage>>,
    calls: Mutex<Vec<MailCall>>,
    send_failure: Mutex<Option<SendFailure>>,
    fail_mark_read: Mutex<bool>,
    drafts: Mutex<usize>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbox(messages: Vec<InboxMessage>) -> Self {
        let mock = Self::new();
        *mock.inbox.lock() = messages;
        mock
    }

    /// Make the next `send_reply` fail.
    pub fn fail_next_send(&self, failure: SendFailure) {
        *self.send_failure.lock() = Some(failure);
    }

    pub fn fail_mark_read(&self, fail: bool) {
        *self.fail_mark_read.lock() = fail;
    }

    pub fn calls(&self) -> Vec<MailCall> {
        self.calls.lock().clone()
    }

    /// Ids of messages marked read, in call order.
    pub fn marked_read(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MailCall::MarkRead { message_id } => Some(message_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MailCall) {
        self.calls.lock().push(call);
    }

    fn rejected(operation: &'static str) -> MailError {
        MailError::Status {
            operation,
            status: 500,
            body: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn fetch_unread(&self, max_count: usize) -> Result<Vec<InboxMessage>> {
        self.record(MailCall::FetchUnread { max_count });
        Ok(self.inbox.lock().iter().take(max_count).cloned().collect())
    }

    async fn send_reply(
        &self,
        message_id: &str,
        body: &str,
        cc: &BTreeSet<String>,
    ) -> Result<SendReceipt> {
        let failure = self.send_failure.lock().take();

        if cc.is_empty() {
            self.record(MailCall::DirectReply {
                message_id: message_id.to_string(),
                body: body.to_string(),
            });
            return match failure {
                Some(_) => Err(Self::rejected("reply")),
                None => Ok(SendReceipt::direct()),
            };
        }

        self.record(MailCall::CreateReply {
            message_id: message_id.to_string(),
        });
        if failure == Some(SendFailure::Rejected) {
            return Err(Self::rejected("createReply"));
        }
        if let Some(SendFailure::AfterDraft(stage @ SendStage::ReadDraft)) = failure {
            return Err(MailError::OrphanDraft {
                draft_id: crate::graph::UNKNOWN_DRAFT_ID.to_string(),
                stage,
                source: Box::new(Self::rejected("read draft")),
            });
        }
        let draft_id = {
            let mut drafts = self.drafts.lock();
            *drafts += 1;
            format!("draft-{}", *drafts)
        };

        self.record(MailCall::PatchDraft {
            draft_id: draft_id.clone(),
            body: body.to_string(),
            cc: cc.clone(),
        });
        if let Some(SendFailure::AfterDraft(stage @ SendStage::Patch)) = failure {
            return Err(MailError::OrphanDraft {
                draft_id,
                stage,
                source: Box::new(Self::rejected("patch draft")),
            });
        }

        self.record(MailCall::SendDraft {
            draft_id: draft_id.clone(),
        });
        if let Some(SendFailure::AfterDraft(stage @ SendStage::Send)) = failure {
            return Err(MailError::OrphanDraft {
                draft_id,
                stage,
                source: Box::new(Self::rejected("send draft")),
            });
        }

        Ok(SendReceipt::via_draft(draft_id))
    }

    async fn mark_read(&self, message_id: &str) -> Result<()> {
        if *self.fail_mark_read.lock() {
            return Err(Self::rejected("mark read"));
        }
        self.record(MailCall::MarkRead {
            message_id: message_id.to_string(),
        });
        self.inbox.lock().retain(|m| m.id != message_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
