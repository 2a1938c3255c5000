//! Microsoft Graph mail transport.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::{MailError, Result};
use crate::token::AccessTokenProvider;
use crate::transport::MailTransport;
use crate::types::{InboxMessage, SendReceipt, SendStage};

/// Graph v1.0 root.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

const SELECT_FIELDS: &str = "subject,body,from,receivedDateTime,id";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    body: Option<ItemBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct DraftCreated {
    id: String,
}

impl From<GraphMessage> for InboxMessage {
    fn from(m: GraphMessage) -> Self {
        let (sender, sender_name) = match m.from {
            Some(Recipient { email_address }) => (
                email_address.address.unwrap_or_default(),
                email_address.name.filter(|n| !n.is_empty()),
            ),
            None => (String::new(), None),
        };
        InboxMessage {
            id: m.id,
            subject: m.subject.unwrap_or_else(|| "(no subject)".to_string()),
            sender,
            sender_name,
            received_at: m.received_date_time.unwrap_or_default(),
            body: m.body.map(|b| b.content).unwrap_or_default(),
        }
    }
}

/// Graph client for the signed-in user's mailbox.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            tokens,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(builder.bearer_auth(token))
    }

    /// Send a request and require `expected`, returning the response.
    async fn expect_status(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
        expected: StatusCode,
    ) -> Result<reqwest::Response> {
        let response = self.authorized(builder).await?.send().await?;
        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(operation, status = status.as_u16(), "Graph request failed");
            return Err(MailError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn reply_direct(&self, message_id: &str, body: &str) -> Result<SendReceipt> {
        let request = self
            .http
            .post(self.url(&format!("/me/messages/{message_id}/reply")))
            .json(&json!({ "comment": body }));
        self.expect_status("reply", request, StatusCode::ACCEPTED)
            .await?;
        tracing::info!(message_id, "Reply sent");
        Ok(SendReceipt::direct())
    }

    async fn reply_with_cc(
        &self,
        message_id: &str,
        body: &str,
        cc: &BTreeSet<String>,
    ) -> Result<SendReceipt> {
        let request = self
            .http
            .post(self.url(&format!("/me/messages/{message_id}/createReply")));
        let response = self
            .expect_status("createReply", request, StatusCode::CREATED)
            .await?;
        // The draft exists from here on, even when its id cannot be read.
        let draft_id = match response.json::<DraftCreated>().await {
            Ok(draft) => draft.id,
            Err(e) => {
                return Err(orphan(
                    UNKNOWN_DRAFT_ID.to_string(),
                    SendStage::ReadDraft,
                    MailError::Serialization(e.to_string()),
                ));
            }
        };

        let patch = self
            .http
            .patch(self.url(&format!("/me/messages/{draft_id}")))
            .json(&draft_patch(body, cc));
        if let Err(e) = self.expect_status("patch draft", patch, StatusCode::OK).await {
            return Err(orphan(draft_id, SendStage::Patch, e));
        }

        let send = self
            .http
            .post(self.url(&format!("/me/messages/{draft_id}/send")));
        if let Err(e) = self
            .expect_status("send draft", send, StatusCode::ACCEPTED)
            .await
        {
            return Err(orphan(draft_id, SendStage::Send, e));
        }

        tracing::info!(message_id, draft_id = %draft_id, cc = cc.len(), "Reply sent with CC");
        Ok(SendReceipt::via_draft(draft_id))
    }
}

/// Draft id reported when createReply succeeded but its body was unreadable.
pub const UNKNOWN_DRAFT_ID: &str = "unknown";

fn draft_patch(body: &str, cc: &BTreeSet<String>) -> serde_json::Value {
    let recipients: Vec<_> = cc
        .iter()
        .map(|address| json!({ "emailAddress": { "address": address } }))
        .collect();
    json!({
        "body": {
            "contentType": "HTML",
            "content": body.replace('\n', "<br>"),
        },
        "ccRecipients": recipients,
    })
}

fn orphan(draft_id: String, stage: SendStage, source: MailError) -> MailError {
    tracing::error!(
        draft_id = %draft_id,
        %stage,
        error = %source,
        "Reply draft left unsent; reconcile it manually"
    );
    MailError::OrphanDraft {
        draft_id,
        stage,
        source: Box::new(source),
    }
}

#[async_trait]
impl MailTransport for GraphClient {
    async fn fetch_unread(&self, max_count: usize) -> Result<Vec<InboxMessage>> {
        let top = max_count.to_string();
        let request = self
            .http
            .get(self.url("/me/mailfolders/inbox/messages"))
            .query(&[
                ("$filter", "isRead eq false"),
                ("$select", SELECT_FIELDS),
                ("$top", top.as_str()),
                ("$orderby", "receivedDateTime desc"),
            ]);
        let response = self
            .expect_status("fetch unread", request, StatusCode::OK)
            .await?;
        let list: MessageList = response.json().await?;
        tracing::debug!(count = list.value.len(), "Fetched unread messages");
        Ok(list.value.into_iter().map(InboxMessage::from).collect())
    }

    async fn send_reply(
        &self,
        message_id: &str,
        body: &str,
        cc: &BTreeSet<String>,
    ) -> Result<SendReceipt> {
        if cc.is_empty() {
            self.reply_direct(message_id, body).await
        } else {
            self.reply_with_cc(message_id, body, cc).await
        }
    }

    async fn mark_read(&self, message_id: &str) -> Result<()> {
        let request = self
            .http
            .patch(self.url(&format!("/me/messages/{message_id}")))
            .json(&json!({ "isRead": true }));
        self.expect_status("mark read", request, StatusCode::OK)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "graph"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticToken;
    use crate::types::SendRoute;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GraphClient {
        GraphClient::new(Arc::new(StaticToken::new("tok"))).with_endpoint(server.uri())
    }

    fn cc(addresses: &[&str]) -> BTreeSet<String> {
        addresses.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_unread() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/mailfolders/inbox/messages"))
            .and(query_param("$filter", "isRead eq false"))
            .and(query_param("$top", "5"))
            .and(query_param("$orderby", "receivedDateTime desc"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "m1",
                    "subject": "Transfer failing",
                    "from": {"emailAddress": {"address": "ops@partner.example", "name": "Ops"}},
                    "receivedDateTime": "2025-05-01T08:30:00Z",
                    "body": {"contentType": "html", "content": "<p>Help</p>"}
                }, {
                    "id": "m2"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client(&server).fetch_unread(5).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "ops@partner.example");
        assert_eq!(messages[0].sender_name.as_deref(), Some("Ops"));
        assert_eq!(messages[0].body_text(), "Help");
        assert_eq!(messages[1].subject, "(no subject)");
        assert_eq!(messages[1].sender, "");
    }

    #[tokio::test]
    async fn test_fetch_unread_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/mailfolders/inbox/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_unread(5).await.unwrap_err();
        assert!(matches!(err, MailError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_reply_without_cc_uses_direct_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/reply"))
            .and(body_json(json!({"comment": "Hello,\nDone."})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/createReply"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_reply("m1", "Hello,\nDone.", &BTreeSet::new())
            .await
            .unwrap();
        assert_eq!(receipt, SendReceipt::direct());
    }

    #[tokio::test]
    async fn test_reply_with_cc_uses_draft_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/reply"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/createReply"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "d1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/messages/d1"))
            .and(body_json(json!({
                "body": {"contentType": "HTML", "content": "Hi<br>CC: jo@example.com"},
                "ccRecipients": [{"emailAddress": {"address": "jo@example.com"}}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages/d1/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send_reply("m1", "Hi\nCC: jo@example.com", &cc(&["jo@example.com"]))
            .await
            .unwrap();
        assert_eq!(receipt.route, SendRoute::DraftWithCc);
        assert_eq!(receipt.draft_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_send_failure_reports_orphan_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/createReply"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "d9"})))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/messages/d9"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages/d9/send"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_reply("m1", "Hi", &cc(&["jo@example.com"]))
            .await
            .unwrap_err();
        assert_eq!(err.orphan_draft_id(), Some("d9"));
        assert!(matches!(
            err,
            MailError::OrphanDraft {
                stage: SendStage::Send,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_draft_is_orphan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/createReply"))
            .respond_with(ResponseTemplate::new(201).set_body_string("<html>created</html>"))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server)
            .send_reply("m1", "Hi", &cc(&["jo@example.com"]))
            .await
            .unwrap_err();
        assert_eq!(err.orphan_draft_id(), Some(UNKNOWN_DRAFT_ID));
        assert!(matches!(
            err,
            MailError::OrphanDraft {
                stage: SendStage::ReadDraft,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_reply_failure_is_not_orphan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages/m1/createReply"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_reply("m1", "Hi", &cc(&["jo@example.com"]))
            .await
            .unwrap_err();
        assert!(err.orphan_draft_id().is_none());
        assert!(matches!(err, MailError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_mark_read() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/me/messages/m1"))
            .and(body_json(json!({"isRead": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).mark_read("m1").await.unwrap();
    }
}
