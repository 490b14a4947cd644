//! Agent-layer errors.

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while running the orchestrator or keeping sessions.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model provider failed after retries
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The session backend failed
    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<AgentError> for pitch_common::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Provider(e) => Self::External(e.to_string()),
            AgentError::Storage(msg) => Self::External(format!("session storage: {msg}")),
            AgentError::SessionNotFound(id) => Self::NotFound(format!("session '{id}'")),
            AgentError::Json(e) => Self::Json(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_maps_to_external() {
        let err: pitch_common::Error =
            AgentError::Provider(ProviderError::new("gemini", "m", "quota")).into();
        assert!(matches!(err, pitch_common::Error::External(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_missing_session_maps_to_not_found() {
        let err: pitch_common::Error = AgentError::SessionNotFound("s1".into()).into();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_sqlite_error_becomes_storage() {
        let err: AgentError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, AgentError::Storage(_)));
    }
}
