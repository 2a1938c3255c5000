//! Built-in corpus of historical MFT/EDI support emails.

use crate::error::Result;
use crate::types::EmailPair;

const PAST_EMAILS_JSON: &str = include_str!("../data/past_emails.json");

/// The bundled query/reply pairs, in their canonical order.
///
/// Order matters: ids are assigned as `email_{index}`.
pub fn past_emails() -> Result<Vec<EmailPair>> {
    Ok(serde_json::from_str(PAST_EMAILS_JSON)?)
}
