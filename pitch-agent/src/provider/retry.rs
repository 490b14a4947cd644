//! Retrying provider wrapper.
//!
//! Retries a failing provider call with exponential backoff. Errors that a
//! retry cannot fix (bad request, missing credentials) are returned at once.

use super::{ChatRequest, ChatResponse, Provider, ProviderError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Retry behaviour for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubles with each retry)
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from the agent configuration.
    pub fn from_config(config: &pitch_common::AgentConfig) -> Self {
        Self {
            max_retries: config.retries,
            base_backoff_ms: config.retry_backoff_ms,
            ..Self::default()
        }
    }

    /// Backoff delay before retry number `attempt + 1`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }
}

/// A provider that retries its inner provider on retryable errors.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_model(&self, model: &str) -> bool {
        self.inner.supports_model(model)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            match self.inner.chat(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            provider = self.inner.name(),
                            attempt = attempt + 1,
                            "Provider recovered after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() || attempt.saturating_add(1) >= attempts => {
                    tracing::error!(
                        provider = self.inner.name(),
                        attempts = attempt + 1,
                        error = %e,
                        "Provider call failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
