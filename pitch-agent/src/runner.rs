//! Agent runs.
//!
//! [`AgentRunner`] is the boundary the gateway talks to: one call runs the
//! orchestrator for one user turn and yields the events of that run.
//! [`LlmAgentRunner`] is the shipped implementation on top of a
//! [`Provider`]; [`handle_agent_request`] wires a runner, the session
//! service and response extraction into one request.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use pitch_common::logging::preview;
use pitch_common::AgentConfig;

use crate::error::{AgentError, Result};
use crate::event::{Content, Event};
use crate::extract::extract_response_stream;
use crate::guardrail::{KeywordGuardrail, GUARDRAIL_STATE_KEY};
use crate::prompt::orchestrator_instruction;
use crate::provider::{
    ChatRequest, GeminiProvider, Message, Provider, RetryPolicy, RetryingProvider,
};
use crate::sanitize;
use crate::session::{Session, SessionService};

/// Events of one agent run, in emission order.
pub type EventStream = BoxStream<'static, Event>;

/// Runs the orchestrator for one user turn.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run `query` in an existing session.
    async fn run(&self, user_id: &str, session_id: &str, query: &str) -> Result<EventStream>;
}

/// Orchestrator backed by a single LLM call per turn.
pub struct LlmAgentRunner {
    config: AgentConfig,
    provider: Arc<dyn Provider>,
    sessions: Arc<dyn SessionService>,
    guardrail: KeywordGuardrail,
    instruction: String,
}

impl LlmAgentRunner {
    /// Create a runner; provider calls are retried per the agent config.
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn Provider>,
        sessions: Arc<dyn SessionService>,
    ) -> Self {
        let provider: Arc<dyn Provider> = Arc::new(RetryingProvider::new(
            provider,
            RetryPolicy::from_config(&config),
        ));

        Self {
            guardrail: KeywordGuardrail::from_config(&config),
            instruction: orchestrator_instruction(),
            config,
            provider,
            sessions,
        }
    }

    /// Create a runner talking to Gemini with the configured API key.
    pub fn from_config(config: &pitch_common::Config, sessions: Arc<dyn SessionService>) -> Self {
        let provider = GeminiProvider::new(config.secrets.google_api_key.clone());
        if !provider.has_api_key() {
            tracing::warn!("No Google API key configured, model calls will fail");
        }
        Self::new(config.agent.clone(), Arc::new(provider), sessions)
    }

    /// Conversation messages from the session transcript.
    fn history(&self, session: &Session) -> Vec<Message> {
        session
            .recent_events(self.config.history_turns)
            .iter()
            .filter(|event| !event.is_escalation())
            .filter_map(|event| {
                let text = event.text()?;
                if event.is_user() {
                    Some(Message::user(text))
                } else {
                    let cleaned = sanitize::clean(&text);
                    (!cleaned.is_empty()).then(|| Message::model(cleaned))
                }
            })
            .filter(|m| !m.content.is_empty())
            .collect()
    }

    async fn call_model(&self, invocation_id: &str, messages: Vec<Message>) -> Result<Event> {
        let model = self.config.model_for_agent(&self.config.agent_name);
        let request = ChatRequest {
            model: model.clone(),
            messages,
            max_tokens: Some(self.config.max_output_tokens),
            temperature: Some(self.config.temperature),
            system: Some(self.instruction.clone()),
        };

        let response = self.provider.chat(request).await?;
        tracing::info!(
            model = %model,
            latency_ms = response.latency_ms,
            output_tokens = response.usage.output_tokens,
            "Model call completed"
        );

        let event = Event::new(invocation_id, &self.config.agent_name).terminal();
        if response.content.trim().is_empty() {
            let reason = response.finish_reason.unwrap_or_else(|| "unknown".into());
            return Ok(event.escalate(Some(format!(
                "Model returned no text (finish reason: {reason})"
            ))));
        }
        Ok(event.with_content(Content::model(response.content)))
    }
}

#[async_trait]
impl AgentRunner for LlmAgentRunner {
    async fn run(&self, user_id: &str, session_id: &str, query: &str) -> Result<EventStream> {
        let mut session = self
            .sessions
            .get_session(&self.config.app_name, user_id, session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;

        let invocation_id = format!("e-{}", uuid::Uuid::new_v4());
        let user_event = Event::new(&invocation_id, "user").with_content(Content::user(query));
        self.sessions
            .append_event(&mut session, user_event.clone())
            .await?;

        let messages = self.history(&session);

        let reply = match self.guardrail.check(&messages) {
            Some(keyword) => {
                tracing::warn!(
                    session_id = %session_id,
                    keyword = %keyword,
                    "Blocked keyword found, skipping model call"
                );
                let mut event = Event::new(&invocation_id, &self.config.agent_name)
                    .with_content(Content::model(KeywordGuardrail::refusal(keyword)))
                    .terminal();
                event
                    .actions
                    .state_delta
                    .insert(GUARDRAIL_STATE_KEY.into(), serde_json::Value::Bool(true));
                event
            }
            None => self.call_model(&invocation_id, messages).await?,
        };

        self.sessions.append_event(&mut session, reply.clone()).await?;

        Ok(stream::iter(vec![user_event, reply]).boxed())
    }
}

/// Collaborators needed to serve an agent request.
#[derive(Clone)]
pub struct AgentServices {
    pub app_name: String,
    pub sessions: Arc<dyn SessionService>,
    pub runner: Arc<dyn AgentRunner>,
}

/// Run one chat turn and return the cleaned answer with the session id used.
pub async fn handle_agent_request(
    services: &AgentServices,
    user_id: &str,
    query: &str,
    session_id: Option<&str>,
) -> pitch_common::Result<(String, String)> {
    if user_id.is_empty() {
        return Err(pitch_common::Error::Auth("Unauthorized".into()));
    }

    tracing::info!(
        user_id = %user_id,
        app_name = %services.app_name,
        query = %preview(query, 80),
        "Agent request"
    );

    let session = services
        .sessions
        .get_or_create_session(&services.app_name, user_id, session_id)
        .await?;

    let events = services.runner.run(user_id, &session.id, query).await?;
    let answer = extract_response_stream(events).await;

    tracing::info!(
        user_id = %user_id,
        session_id = %session.id,
        answer_chars = answer.chars().count(),
        "Agent request completed"
    );
    Ok((answer, session.id))
}
