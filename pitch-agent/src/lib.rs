//! Pitch Agent - orchestrator runs and response handling for Pitchmate.
//!
//! Provides:
//! - The per-session founder context store and query enrichment
//! - Conversation events and the response extraction pipeline that turns
//!   a run's events into one clean answer
//! - The Gemini provider, keyword guardrail and session services
//! - The agent runner boundary used by the gateway
//!
//! ## Example
//!
//! ```ignore
//! use pitch_agent::{build_enriched_query, handle_agent_request, SessionContextStore};
//!
//! let context = store.get_context(Some(&session_id)).await;
//! let query = build_enriched_query(&raw_query, &context);
//! let (answer, session_id) =
//!     handle_agent_request(&services, &user_id, &query, Some(&session_id)).await?;
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod extract;
pub mod guardrail;
pub mod prompt;
pub mod provider;
pub mod runner;
pub mod sanitize;
pub mod session;

pub use context::{build_enriched_query, SessionContextStore};
pub use error::AgentError;
pub use event::{Content, Event, EventActions, Part, Role};
pub use extract::{extract_response, extract_response_stream, ExtractionState, NO_FINAL_RESPONSE};
pub use guardrail::KeywordGuardrail;
pub use provider::{GeminiProvider, Provider};
pub use runner::{handle_agent_request, AgentRunner, AgentServices, EventStream, LlmAgentRunner};
pub use session::{
    session_service_from_config, InMemorySessionService, Session, SessionService,
    SqliteSessionService,
};
