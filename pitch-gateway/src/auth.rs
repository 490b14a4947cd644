//! Authentication module for Pitchmate Gateway.
//!
//! Validates HS256 bearer tokens signed with a shared secret (for example a
//! Supabase project JWT secret). The `sub` claim becomes the user id. With no
//! secret configured every request is admitted as [`ANONYMOUS_USER`].

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// User id assigned when authentication is disabled.
pub const ANONYMOUS_USER: &str = "anonymous";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

/// Authentication state shared across requests.
#[derive(Clone)]
pub struct AuthState {
    jwt_secret: Option<Arc<String>>,
}

impl AuthState {
    /// Create auth state; `None` or an empty secret disables authentication.
    pub fn new(jwt_secret: Option<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.filter(|s| !s.is_empty()).map(Arc::new),
        }
    }

    pub fn from_config(config: &pitch_common::AuthConfig) -> Self {
        Self::new(config.jwt_secret.clone())
    }

    /// Whether bearer tokens are required.
    pub fn is_enabled(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Validate a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let secret = self
            .jwt_secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("JWT secret not configured"))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims)
    }
}

/// User info extracted from authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !auth_state.is_enabled() {
        request.extensions_mut().insert(AuthUser {
            user_id: ANONYMOUS_USER.into(),
        });
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    match auth_state.validate_token(token) {
        Ok(claims) if !claims.sub.is_empty() => {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
            });
            Ok(next.run(request).await)
        }
        Ok(_) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
