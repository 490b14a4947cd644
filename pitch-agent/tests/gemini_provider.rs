//! Gemini provider tests against a mock Generative Language API.

use std::sync::Arc;

use pitch_agent::provider::{ChatRequest, GeminiProvider, Message, Provider};
use pitch_agent::{handle_agent_request, AgentServices, InMemorySessionService, LlmAgentRunner, SessionService};
use pitch_common::AgentConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::with_base_url(Some("test-key".into()), format!("{}/v1beta", server.uri()))
}

fn request(text: &str) -> ChatRequest {
    ChatRequest {
        model: "gemini-2.5-flash".into(),
        messages: vec![Message::user(text)],
        max_tokens: Some(1024),
        temperature: Some(0.3),
        system: Some("You are Pitchmate.".into()),
    }
}

#[tokio::test]
async fn chat_joins_text_parts_and_reads_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "You are Pitchmate."}]},
            "contents": [{"role": "user", "parts": [{"text": "What is my TAM?"}]}],
            "generationConfig": {"maxOutputTokens": 1024}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Your TAM "}, {"text": "is $4B."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server).chat(request("What is my TAM?")).await.unwrap();

    assert_eq!(response.content, "Your TAM is $4B.");
    assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    assert_eq!(response.usage.input_tokens, 12);
    assert_eq!(response.usage.total_tokens, 17);
}

#[tokio::test]
async fn chat_reports_http_errors_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let err = provider(&server).chat(request("hi")).await.unwrap_err();

    assert_eq!(err.status_code, Some(429));
    assert!(err.is_retryable());
    assert!(err.message.contains("quota exceeded"));
}

#[tokio::test]
async fn blocked_prompt_returns_empty_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let response = provider(&server).chat(request("hi")).await.unwrap();

    assert!(response.content.is_empty());
    assert_eq!(response.finish_reason.as_deref(), Some("SAFETY"));
}

#[tokio::test]
async fn body_level_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "model overloaded"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).chat(request("hi")).await.unwrap_err();
    assert!(err.message.contains("model overloaded"));
}

#[tokio::test]
async fn agent_request_returns_cleaned_gemini_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{
                    "text": "/*REASONING*/ Next steps belong to the strategist.\n\n/*FINAL_ANSWER*/\nThe market_strategist_agent has provided your next steps. Here are the details: do X, then Y."
                }]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = AgentConfig {
        retries: 0,
        ..AgentConfig::default()
    };
    let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    let runner = LlmAgentRunner::new(config.clone(), Arc::new(provider(&server)), sessions.clone());
    let services = AgentServices {
        app_name: config.app_name,
        sessions,
        runner: Arc::new(runner),
    };

    let (answer, session_id) =
        handle_agent_request(&services, "founder-1", "What are my next steps?", Some("chat-9"))
            .await
            .unwrap();

    assert_eq!(answer, "Here are the details: do X, then Y.");
    assert_eq!(session_id, "chat-9");
}
