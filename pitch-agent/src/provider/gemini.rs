//! Google Gemini provider.
//!
//! Talks to the Generative Language REST API (`models/{model}:generateContent`).
//! The base URL is configurable so tests can point it at a local mock server.

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider authenticated with an API key.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i64>,
}

impl GeminiProvider {
    /// Create a provider for the public Gemini endpoint.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a provider for a custom endpoint.
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{model_name}:generateContent", self.base_url)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_model(&self, model: &str) -> bool {
        model.trim_start_matches("models/").starts_with("gemini-")
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let model = request.model.as_str();

        let api_key = self.api_key.as_ref().ok_or_else(|| ProviderError {
            status_code: Some(401),
            ..ProviderError::new(
                PROVIDER_NAME,
                model,
                "Gemini API key not found. Set GOOGLE_API_KEY or GEMINI_API_KEY.",
            )
        })?;

        let system_instruction = request.system.as_ref().map(|sys| Content {
            role: None,
            parts: vec![Part { text: sys.clone() }],
        });

        let contents: Vec<Content> = request
            .messages
            .iter()
            .map(|msg| Content {
                role: Some(match msg.role.as_str() {
                    "assistant" => "model".to_string(),
                    other => other.to_string(),
                }),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        let body = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(0.3),
                max_output_tokens: request.max_tokens.unwrap_or(8192),
            },
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER_NAME, model, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError {
                status_code: Some(status.as_u16()),
                ..ProviderError::new(
                    PROVIDER_NAME,
                    model,
                    format!("API error ({}): {}", status.as_u16(), error_text),
                )
            });
        }

        let result: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new(PROVIDER_NAME, model, format!("Failed to parse response: {e}"))
        })?;

        if let Some(err) = result.error {
            return Err(ProviderError::new(
                PROVIDER_NAME,
                model,
                format!("API error: {}", err.message),
            ));
        }

        let usage = result.usage_metadata.map_or(TokenUsage::default(), |u| TokenUsage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count.unwrap_or(0),
        });

        // A blocked prompt comes back with no candidates and a block reason.
        let block_reason = result.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = result.candidates.and_then(|c| c.into_iter().next());

        let (content, finish_reason) = match (candidate, block_reason) {
            (Some(candidate), _) => {
                let text: String = candidate
                    .content
                    .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                    .unwrap_or_default();
                (text, candidate.finish_reason)
            }
            (None, Some(reason)) => (String::new(), Some(reason)),
            (None, None) => {
                return Err(ProviderError::new(
                    PROVIDER_NAME,
                    model,
                    "No response from Gemini",
                ));
            }
        };

        tracing::debug!(
            model = %model,
            output_tokens = usage.output_tokens,
            finish_reason = ?finish_reason,
            "Gemini response received"
        );

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model.clone(),
            content,
            usage,
            finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
