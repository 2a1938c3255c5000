//! Access-token storage and refresh.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::device::{self, DeviceCodeConfig, TokenResponse};
use crate::error::{MailError, Result};

/// Refresh this long before the token actually expires.
const REFRESH_BUFFER_MINUTES: i64 = 5;

/// Supplies a bearer token for each Graph request.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for tests and for tokens minted elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Tokens persisted after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
}

impl MailTokens {
    pub(crate) fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now + Duration::seconds(response.expires_in),
            scope: response.scope,
            token_type: response.token_type,
        }
    }

    /// True once within the refresh buffer of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(REFRESH_BUFFER_MINUTES) >= self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// File-backed token store with an in-memory cache.
///
/// When a refresh configuration is attached, tokens near expiry are
/// exchanged with the stored refresh token and written back.
pub struct FileTokenStore {
    path: PathBuf,
    refresh: Option<DeviceCodeConfig>,
    http: reqwest::Client,
    cached: RwLock<Option<MailTokens>>,
}

impl std::fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("path", &self.path)
            .field("refresh", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            refresh: None,
            http: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Allow refreshing expired tokens against this app registration.
    pub fn with_refresh(mut self, config: DeviceCodeConfig) -> Self {
        self.refresh = Some(config);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read tokens from disk. `None` when nobody has signed in.
    pub fn load(&self) -> Result<Option<MailTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let tokens = serde_json::from_str(&content)?;
        Ok(Some(tokens))
    }

    /// Write tokens to disk and replace the cache.
    pub async fn save(&self, tokens: &MailTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, content)?;
        *self.cached.write().await = Some(tokens.clone());
        tracing::debug!(path = %self.path.display(), "Saved mail tokens");
        Ok(())
    }

    /// Remove stored tokens. Returns whether a file was deleted.
    pub async fn delete(&self) -> Result<bool> {
        *self.cached.write().await = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn current(&self) -> Result<MailTokens> {
        if let Some(tokens) = self.cached.read().await.clone() {
            return Ok(tokens);
        }
        let tokens = self.load()?.ok_or(MailError::NotSignedIn)?;
        *self.cached.write().await = Some(tokens.clone());
        Ok(tokens)
    }
}

#[async_trait]
impl AccessTokenProvider for FileTokenStore {
    async fn access_token(&self) -> Result<String> {
        let tokens = self.current().await?;
        let now = Utc::now();
        if !tokens.needs_refresh(now) {
            return Ok(tokens.access_token);
        }

        match (&self.refresh, &tokens.refresh_token) {
            (Some(config), Some(refresh_token)) => {
                tracing::debug!("Refreshing mail access token");
                let mut fresh = device::refresh_tokens(&self.http, config, refresh_token).await?;
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = Some(refresh_token.clone());
                }
                self.save(&fresh).await?;
                Ok(fresh.access_token)
            }
            _ if !tokens.is_expired(now) => Ok(tokens.access_token),
            _ => Err(MailError::Auth(
                "Access token expired. Run `replydesk auth login` again.".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens(expires_in_minutes: i64) -> MailTokens {
        MailTokens {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
            scope: "Mail.Send".into(),
            token_type: "Bearer".into(),
        }
    }

    #[test]
    fn test_refresh_buffer() {
        let now = Utc::now();
        assert!(!tokens(60).needs_refresh(now));
        assert!(tokens(3).needs_refresh(now));
        assert!(!tokens(3).is_expired(now));
        assert!(tokens(-1).is_expired(now));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_signed_in() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().unwrap().is_none());
        let err = store.access_token().await.unwrap_err();
        assert!(matches!(err, MailError::NotSignedIn));
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("auth").join("tokens.json"));
        let saved = tokens(60);
        store.save(&saved).await.unwrap();

        assert_eq!(store.load().unwrap(), Some(saved));
        assert_eq!(store.access_token().await.unwrap(), "access");

        assert!(store.delete().await.unwrap());
        assert!(!store.delete().await.unwrap());
        assert!(matches!(
            store.access_token().await.unwrap_err(),
            MailError::NotSignedIn
        ));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_config() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&tokens(-10)).await.unwrap();
        let err = store.access_token().await.unwrap_err();
        assert!(matches!(err, MailError::Auth(_)));
    }

    #[tokio::test]
    async fn test_refreshes_near_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/consumers/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json")).with_refresh(
            DeviceCodeConfig::new("client", "consumers").with_authority(server.uri()),
        );
        store.save(&tokens(2)).await.unwrap();

        assert_eq!(store.access_token().await.unwrap(), "new-access");
        let on_disk = store.load().unwrap().unwrap();
        assert_eq!(on_disk.access_token, "new-access");
        assert_eq!(on_disk.refresh_token.as_deref(), Some("refresh"));
        // cached now, no second refresh
        assert_eq!(store.access_token().await.unwrap(), "new-access");
    }
}
