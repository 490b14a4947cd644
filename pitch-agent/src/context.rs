//! Session context store.
//!
//! Keeps one piece of founder-supplied background text per chat session and
//! prepends it to queries sent to the orchestrator agent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Per-session founder context, shared between request handlers.
///
/// Entries live for the process lifetime. A later `set_context` for the same
/// session replaces the earlier value.
#[derive(Debug, Clone, Default)]
pub struct SessionContextStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `context` for `session_id`, replacing any previous value.
    pub async fn set_context(&self, session_id: impl Into<String>, context: impl Into<String>) {
        let session_id = session_id.into();
        let context = context.into();
        tracing::debug!(
            session_id = %session_id,
            context_chars = context.chars().count(),
            "Storing session context"
        );
        self.entries.write().await.insert(session_id, context);
    }

    /// Context for `session_id`, or an empty string when none is stored.
    pub async fn get_context(&self, session_id: Option<&str>) -> String {
        let Some(id) = session_id.filter(|id| !id.is_empty()) else {
            return String::new();
        };
        self.entries.read().await.get(id).cloned().unwrap_or_default()
    }

    /// Number of sessions with stored context.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Prepend founder context to a raw user query.
pub fn build_enriched_query(raw_query: &str, context: &str) -> String {
    if context.is_empty() {
        return raw_query.to_string();
    }
    format!("## Your Startup Context\n{context}\n\n---\n## User Question\n{raw_query}")
}
