//! OAuth 2.0 device-code sign-in against the Microsoft identity platform.
//!
//! The CLI shows the user code and verification URL, then polls the token
//! endpoint until the user finishes signing in elsewhere.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{MailError, Result};
use crate::token::MailTokens;

/// Identity platform host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scopes needed to read, reply to and mark mail.
pub const MAIL_SCOPES: &str = "Mail.ReadWrite Mail.Send User.Read offline_access";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// App registration details for sign-in.
#[derive(Debug, Clone)]
pub struct DeviceCodeConfig {
    pub client_id: String,
    /// Tenant id, or `consumers` / `organizations` / `common`.
    pub tenant: String,
    pub authority: String,
    pub scope: String,
}

impl DeviceCodeConfig {
    pub fn new(client_id: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant: tenant.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
            scope: MAIL_SCOPES.to_string(),
        }
    }

    /// Point at a different identity host (used by tests).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn device_code_url(&self) -> String {
        self.endpoint("devicecode")
    }

    pub fn token_url(&self) -> String {
        self.endpoint("token")
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority.trim_end_matches('/'),
            self.tenant,
            leaf
        )
    }
}

/// Device authorization response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until `device_code` stops working.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Human-readable instructions from the provider.
    #[serde(default)]
    pub message: String,
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Request a device code and user code.
pub async fn start_device_flow(
    client: &reqwest::Client,
    config: &DeviceCodeConfig,
) -> Result<DeviceCode> {
    let response = client
        .post(config.device_code_url())
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("scope", config.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| MailError::Network(format!("Device code request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(MailError::Auth(format!(
            "Failed to create device flow (HTTP {status}): {body}. Check the app registration."
        )));
    }

    response
        .json()
        .await
        .map_err(|e| MailError::Auth(format!("Failed to parse device code response: {e}")))
}

/// Poll until the user completes sign-in, the code expires, or sign-in is
/// refused.
pub async fn poll_for_token(
    client: &reqwest::Client,
    config: &DeviceCodeConfig,
    code: &DeviceCode,
) -> Result<MailTokens> {
    let deadline = Instant::now() + Duration::from_secs(code.expires_in);
    let mut interval = Duration::from_secs(code.interval.max(1));

    loop {
        tokio::time::sleep(interval).await;
        if Instant::now() >= deadline {
            return Err(MailError::Auth(
                "Device code expired before sign-in completed".to_string(),
            ));
        }

        let response = client
            .post(config.token_url())
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", config.client_id.as_str()),
                ("device_code", code.device_code.as_str()),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await?;
            tracing::info!("Mail sign-in completed");
            return Ok(MailTokens::from_response(token, chrono::Utc::now()));
        }

        let body = response.text().await.unwrap_or_default();
        let error: TokenErrorResponse = serde_json::from_str(&body)
            .map_err(|_| MailError::Auth(format!("Unexpected token response: {body}")))?;
        match error.error.as_str() {
            "authorization_pending" => {
                tracing::debug!("Waiting for user to complete sign-in");
            }
            "slow_down" => {
                interval += Duration::from_secs(5);
                tracing::debug!(interval_secs = interval.as_secs(), "Token endpoint asked to slow down");
            }
            _ => {
                let detail = if error.error_description.is_empty() {
                    error.error
                } else {
                    error.error_description
                };
                return Err(MailError::Auth(format!("Sign-in failed: {detail}")));
            }
        }
    }
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_tokens(
    client: &reqwest::Client,
    config: &DeviceCodeConfig,
    refresh_token: &str,
) -> Result<MailTokens> {
    let response = client
        .post(config.token_url())
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("scope", config.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| MailError::Network(format!("Token refresh request failed: {e}")))?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MailError::Auth(format!("Token refresh failed: {body}")));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| MailError::Auth(format!("Failed to parse refresh response: {e}")))?;
    Ok(MailTokens::from_response(token, chrono::Utc::now()))
}
