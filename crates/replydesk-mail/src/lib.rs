//! Mailbox access for replydesk.
//!
//! [`MailTransport`] is the seam the send workflow talks to. [`GraphClient`]
//! implements it against Microsoft Graph using tokens from a
//! [`FileTokenStore`], which the device-code flow in [`device`] fills.
//! [`MockMailTransport`] records calls for tests.

pub mod device;
pub mod error;
pub mod graph;
pub mod html;
pub mod mock;
pub mod token;
pub mod transport;
pub mod types;

pub use device::{
    DEFAULT_AUTHORITY, DeviceCode, DeviceCodeConfig, MAIL_SCOPES, poll_for_token, refresh_tokens,
    start_device_flow,
};
pub use error::{MailError, Result};
pub use graph::{DEFAULT_GRAPH_ENDPOINT, GraphClient, UNKNOWN_DRAFT_ID};
pub use html::{PREVIEW_CHARS, preview, strip_html};
pub use mock::{MailCall, MockMailTransport, SendFailure};
pub use token::{AccessTokenProvider, FileTokenStore, MailTokens, StaticToken};
pub use transport::{MailTransport, SharedTransport};
pub use types::{InboxMessage, SendReceipt, SendRoute, SendStage};
