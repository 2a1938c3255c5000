//! Mail transport types.

use serde::{Deserialize, Serialize};

use crate::html;

/// An unread message fetched from the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: String,
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// Sender display name, if the provider gave one.
    pub sender_name: Option<String>,
    /// Provider timestamp, as received (ISO 8601).
    pub received_at: String,
    /// Raw body; HTML or plain text.
    pub body: String,
}

impl InboxMessage {
    /// Body with HTML tags removed.
    pub fn body_text(&self) -> String {
        html::strip_html(&self.body)
    }

    pub fn preview(&self) -> String {
        html::preview(&self.body)
    }

    /// Date part of `received_at`.
    pub fn received_date(&self) -> &str {
        self.received_at.get(..10).unwrap_or(&self.received_at)
    }

    /// Text handed to the drafting service: `From: {sender}` then the body.
    pub fn drafting_input(&self) -> String {
        format!("From: {}\n\n{}", self.sender, self.body_text())
    }
}

/// Which provider path delivered a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendRoute {
    /// Single direct-reply call (no CC).
    DirectReply,
    /// Create draft, patch body and CC, send draft.
    DraftWithCc,
}

/// Steps of the CC send sequence after the draft exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStage {
    /// Reading the created draft's id.
    ReadDraft,
    Patch,
    Send,
}

impl std::fmt::Display for SendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendStage::ReadDraft => f.write_str("read draft"),
            SendStage::Patch => f.write_str("patch"),
            SendStage::Send => f.write_str("send"),
        }
    }
}

/// Proof of a delivered reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub route: SendRoute,
    /// Set for [`SendRoute::DraftWithCc`].
    pub draft_id: Option<String>,
}

impl SendReceipt {
    pub fn direct() -> Self {
        Self {
            route: SendRoute::DirectReply,
            draft_id: None,
        }
    }

    pub fn via_draft(draft_id: impl Into<String>) -> Self {
        Self {
            route: SendRoute::DraftWithCc,
            draft_id: Some(draft_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> InboxMessage {
        InboxMessage {
            id: "AAMk1".into(),
            subject: "Transfer failed".into(),
            sender: "ops@partner.example".into(),
            sender_name: Some("Partner Ops".into()),
            received_at: "2025-05-01T08:30:00Z".into(),
            body: "<p>File to XYZ failed</p>".into(),
        }
    }

    #[test]
    fn test_drafting_input() {
        assert_eq!(
            message().drafting_input(),
            "From: ops@partner.example\n\nFile to XYZ failed"
        );
    }

    #[test]
    fn test_received_date() {
        assert_eq!(message().received_date(), "2025-05-01");
        let short = InboxMessage {
            received_at: "n/a".into(),
            ..message()
        };
        assert_eq!(short.received_date(), "n/a");
    }
}
