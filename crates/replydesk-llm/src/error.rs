//! Error types for the LLM crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider said).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Parse a rate limit response body and optional `Retry-After` header.
    ///
    /// Groq puts the wait into the message ("Please try again in 6.57s"),
    /// OpenAI uses the header. The header wins when both are present.
    pub fn parse(message: &str, retry_after_header: Option<&str>) -> Self {
        let retry_after = retry_after_header
            .and_then(parse_retry_after_header)
            .or_else(|| parse_message_retry_after(message));

        Self {
            message: message.to_string(),
            retry_after,
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse "try again in Xs" out of a provider message.
fn parse_message_retry_after(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find("try again in ")? + "try again in ".len();

    let num: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    num.parse::<f64>().ok().map(Duration::from_secs_f64)
}

/// Parse a Retry-After header value given in seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmError
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for completion and embedding calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, unknown provider, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Network and rate limit errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(LlmError::rate_limit("rate limited").is_retryable());
        assert!(!LlmError::Config("bad config".to_string()).is_retryable());
        assert!(!LlmError::Auth("unauthorized".to_string()).is_retryable());
        assert!(!LlmError::Backend("server error".to_string()).is_retryable());
    }

    #[test]
    fn test_parse_groq_message() {
        let info = RateLimitInfo::parse(
            "Rate limit reached on tokens per minute (TPM). Please try again in 6.57792s.",
            None,
        );
        let retry = info.retry_after.unwrap();
        assert!((retry.as_secs_f64() - 6.57792).abs() < 0.001);

        let info = RateLimitInfo::parse("Rate limit exceeded", None);
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn test_header_wins_over_message() {
        let info = RateLimitInfo::parse("Try again in 10s", Some(" 3 "));
        assert_eq!(info.retry_after, Some(Duration::from_secs(3)));

        let info = RateLimitInfo::parse("Try again in 10s", Some("soon"));
        assert_eq!(info.retry_after, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_rate_limit_display() {
        let info = RateLimitInfo::parse("Rate limited", Some("6"));
        assert!(info.to_string().contains("retry after 6.00s"));
        assert_eq!(
            LlmError::RateLimit(info).retry_after(),
            Some(Duration::from_secs(6))
        );
        assert_eq!(LlmError::Network("x".into()).retry_after(), None);
    }
}
