//! HTTP routes for Pitchmate Gateway.
//!
//! - `POST /context`, `GET /context`: founder context per chat session
//! - `POST /chat`: one orchestrator turn
//! - `GET /artifacts/download/:filename`: generated documents
//! - `GET /health`

use crate::artifacts::download_artifact_handler;
use crate::auth::{auth_middleware, AuthState, AuthUser};
use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use pitch_agent::{build_enriched_query, handle_agent_request, AgentServices, SessionContextStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────────────────

/// State shared by the authenticated routes.
#[derive(Clone)]
pub struct AppState {
    pub context: SessionContextStore,
    pub agent: AgentServices,
    pub artifacts_root: PathBuf,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub(crate) fn reply(
        status: StatusCode,
        error: impl Into<String>,
        code: &str,
    ) -> (StatusCode, Json<ErrorResponse>) {
        (
            status,
            Json(ErrorResponse {
                error: error.into(),
                code: code.into(),
            }),
        )
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Body of `POST /context`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextRequest {
    pub context: String,
    /// A new session id is generated when omitted
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Query of `GET /context`.
#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub context: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Body of `POST /chat`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: String,
    pub response: String,
    pub session_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Health routes (public).
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Authenticated application routes.
pub fn app_routes(state: AppState, auth_state: AuthState) -> Router {
    Router::new()
        .route(
            "/context",
            get(get_context_handler).post(save_context_handler),
        )
        .route("/chat", post(chat_handler))
        .route("/artifacts/download/:filename", get(download_artifact_handler))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
        .with_state(state)
}

/// Every gateway route.
pub fn build_all_routes(state: AppState, auth_state: AuthState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(app_routes(state, auth_state))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "pitch-gateway".into(),
    })
}

async fn save_context_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<ContextRequest>,
) -> Json<ContextResponse> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let context = request.context.trim().to_string();

    state.context.set_context(&session_id, context.clone()).await;
    tracing::info!(
        session_id = %session_id,
        user_id = %auth_user.user_id,
        context_chars = context.chars().count(),
        "Saved startup context"
    );

    Json(ContextResponse {
        context,
        message: "Context saved for this chat session".into(),
        session_id: Some(session_id),
    })
}

async fn get_context_handler(
    State(state): State<AppState>,
    Query(query): Query<ContextQuery>,
) -> Json<ContextResponse> {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return Json(ContextResponse {
            context: String::new(),
            message: "No session_id provided".into(),
            session_id: None,
        });
    };

    let context = state.context.get_context(Some(&session_id)).await;
    let message = if context.is_empty() {
        "No context for this session"
    } else {
        "ok"
    };

    Json(ContextResponse {
        context,
        message: message.into(),
        session_id: None,
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.query.trim().is_empty() {
        return Err(ErrorResponse::reply(
            StatusCode::BAD_REQUEST,
            "Query must not be empty",
            "INVALID_INPUT",
        ));
    }

    let session_id = request.session_id.as_deref().filter(|id| !id.is_empty());
    let context = state.context.get_context(session_id).await;
    if !context.is_empty() {
        tracing::info!(
            session_id = ?session_id,
            context_chars = context.chars().count(),
            "Injected session context"
        );
    }
    let query = build_enriched_query(&request.query, &context);

    match handle_agent_request(&state.agent, &auth_user.user_id, &query, session_id).await {
        Ok((response, session_id)) => Ok(Json(ChatResponse {
            status: "success".into(),
            response,
            session_id,
        })),
        Err(e) if e.is_auth() => Err(ErrorResponse::reply(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            e.code(),
        )),
        Err(e) => {
            tracing::error!(
                user_id = %auth_user.user_id,
                error = %e,
                "Pitchmate agent error"
            );
            Err(ErrorResponse::reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process request: {e}"),
                "AGENT_ERROR",
            ))
        }
    }
}
