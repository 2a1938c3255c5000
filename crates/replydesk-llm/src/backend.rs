//! LLM Backend trait and implementations.
//!
//! This module defines the abstraction over completion providers and a
//! scripted mock for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits). A rate
/// limit that names its own wait overrides the backoff for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for completion providers.
///
/// The drafting service treats the provider as an opaque text-completion
/// service: one request in, one response out, no streaming.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is reachable and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted outcome for [`MockBackend`].
#[derive(Debug)]
pub enum MockResponse {
    /// Reply with this text.
    Text(String),
    /// Fail with this error.
    Error(LlmError),
    /// Sleep, then reply with this text. Used to exercise timeouts.
    Delayed(Duration, String),
}

/// A mock backend for testing purposes.
///
/// Returns pre-configured responses in order and records every request so
/// tests can inspect the prompt that was sent.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend with the given scripted responses.
    ///
    /// If more requests are made than responses available, an error is
    /// returned.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Create a mock backend whose only call fails.
    pub fn with_error(error: LlmError) -> Self {
        Self::new(vec![MockResponse::Error(error)])
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    fn respond(request: &CompletionRequest, text: String) -> CompletionResponse {
        let input = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count() as u32)
            .sum();
        let output = text.split_whitespace().count() as u32;
        CompletionResponse::new(
            "mock_msg",
            request.model.clone(),
            text,
            StopReason::EndTurn,
            Usage::new(input, output),
        )
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().push(request.clone());

        let next = self.responses.lock().pop_front();
        match next {
            Some(MockResponse::Text(text)) => Ok(Self::respond(&request, text)),
            Some(MockResponse::Error(e)) => Err(e),
            Some(MockResponse::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(Self::respond(&request, text))
            }
            None => Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let request = CompletionRequest::single_turn("test-model", "Hi", 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text, "Hello!");
        assert_eq!(response.model, "test-model");
        assert_eq!(backend.request_count(), 1);
        assert_eq!(backend.requests()[0].last_user_text(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_mock_backend_scripted_sequence() {
        let backend = MockBackend::new(vec![
            MockResponse::Text("First".to_string()),
            MockResponse::Error(LlmError::Auth("bad key".to_string())),
        ]);

        let r1 = backend
            .complete(CompletionRequest::single_turn("m", "1", 10))
            .await
            .unwrap();
        assert_eq!(r1.text, "First");

        let r2 = backend
            .complete(CompletionRequest::single_turn("m", "2", 10))
            .await;
        assert!(matches!(r2, Err(LlmError::Auth(_))));

        let r3 = backend
            .complete(CompletionRequest::single_turn("m", "3", 10))
            .await;
        assert!(matches!(r3, Err(LlmError::Backend(_))));
        assert_eq!(backend.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_backend_delayed() {
        let backend = MockBackend::new(vec![MockResponse::Delayed(
            Duration::from_secs(5),
            "late".to_string(),
        )]);
        let response = backend
            .complete(CompletionRequest::single_turn("m", "hi", 10))
            .await
            .unwrap();
        assert_eq!(response.text, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(10), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Network("flaky".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(10), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::rate_limit("slow down")) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::RateLimit(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(5, Duration::from_millis(10), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Auth("nope".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
