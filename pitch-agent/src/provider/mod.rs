//! LLM provider abstraction.
//!
//! The orchestrator talks to its model through the [`Provider`] trait so the
//! runner can be exercised against scripted providers in tests. The shipped
//! implementation is [`GeminiProvider`]; [`RetryingProvider`] adds bounded
//! retries with exponential backoff around any provider.

mod gemini;
mod retry;

pub use gemini::GeminiProvider;
pub use retry::{RetryPolicy, RetryingProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for LLM providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Check if this provider supports a given model.
    fn supports_model(&self, model: &str) -> bool;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub(crate) fn new(provider: &str, model: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, rate limits and server errors are retryable;
    /// other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.status_code {
            None => true,
            Some(code) => code == 408 || code == 429 || code >= 500,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Conversation so far, oldest first, ending with the new user turn
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// `user` or `model`
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: "model".into(),
            content: content.into(),
        }
    }
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response text, empty when the model returned none
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}
