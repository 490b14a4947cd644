//! Pitchmate Gateway - HTTP surface of the Pitchmate assistant.
//!
//! This crate provides:
//! - Bearer-token authentication (HS256, Supabase compatible)
//! - Per-chat founder context storage
//! - The chat endpoint that runs the orchestrator and returns a cleaned answer
//! - Download of generated artifacts
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (auth → context enrichment) → Orchestrator → Gemini
//!                                   ↓
//!                          response extraction
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod artifacts;
pub mod auth;
pub mod routes;

pub use auth::{AuthState, AuthUser, ANONYMOUS_USER};
pub use routes::{AppState, ErrorResponse};

use axum::Router;
use pitch_agent::{session_service_from_config, AgentServices, LlmAgentRunner, SessionContextStore};
use pitch_common::config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build application state from configuration.
pub fn build_state(config: &Config) -> AppState {
    let sessions = session_service_from_config(&config.storage);
    let runner = LlmAgentRunner::from_config(config, sessions.clone());

    AppState {
        context: SessionContextStore::new(),
        agent: AgentServices {
            app_name: config.agent.app_name.clone(),
            sessions,
            runner: Arc::new(runner),
        },
        artifacts_root: PathBuf::from(&config.storage.artifacts_root_dir),
    }
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config) -> Router {
    let auth_state = AuthState::from_config(&config.auth);
    if !auth_state.is_enabled() {
        tracing::warn!("No JWT secret configured, requests are served as '{ANONYMOUS_USER}'");
    }

    build_router_with(build_state(config), auth_state)
}

/// Build the gateway router around prepared state.
pub fn build_router_with(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_all_routes(state, auth_state).layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let router = build_router(config);

    tracing::info!("Starting Pitchmate Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
