//! Send workflow: deliver a reply, mark the source read, record a follow-up.

use std::collections::BTreeSet;
use std::sync::Arc;

use replydesk_mail::{InboxMessage, SendReceipt, SharedTransport};
use replydesk_tracker::{FollowUp, FollowUpTracker, NewFollowUp, Priority};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::reply;

/// What a successful send did.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub receipt: SendReceipt,
    pub cc: BTreeSet<String>,
    /// False when the reply went out but the source could not be marked read.
    pub marked_read: bool,
    pub follow_up: FollowUp,
}

/// Sends replies and opens follow-ups for them.
#[derive(Clone)]
pub struct SendService {
    transport: SharedTransport,
    tracker: Arc<FollowUpTracker>,
}

impl SendService {
    pub fn new(transport: SharedTransport, tracker: Arc<FollowUpTracker>) -> Self {
        Self { transport, tracker }
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Send `body` as the reply to `message`.
    ///
    /// CC addresses are taken from the final body, so edits made after
    /// drafting count. If delivery fails the message stays unread and no
    /// follow-up is recorded.
    pub async fn send(
        &self,
        message: &InboxMessage,
        body: &str,
        priority: Priority,
    ) -> Result<SendOutcome> {
        let cc = reply::extract_cc(body);

        let receipt = match self.transport.send_reply(&message.id, body, &cc).await {
            Ok(receipt) => receipt,
            Err(e) => {
                match e.orphan_draft_id() {
                    Some(draft_id) => error!(
                        message_id = %message.id,
                        draft_id,
                        "Send left an orphan draft"
                    ),
                    None => warn!(message_id = %message.id, error = %e, "Send failed"),
                }
                return Err(e.into());
            }
        };

        let marked_read = match self.transport.mark_read(&message.id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Reply sent but message not marked read");
                false
            }
        };

        let follow_up = self.tracker.create(NewFollowUp::new(
            message.subject.as_str(),
            message.sender.as_str(),
            reply::summarize(body),
            priority,
        ))?;
        info!(
            message_id = %message.id,
            follow_up = follow_up.id,
            priority = %priority,
            route = ?receipt.route,
            "Reply sent, follow-up opened"
        );

        Ok(SendOutcome {
            receipt,
            cc,
            marked_read,
            follow_up,
        })
    }
}
