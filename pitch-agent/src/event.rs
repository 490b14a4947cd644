//! Conversation events emitted by an agent run.
//!
//! An agent run produces an ordered sequence of [`Event`]s. Each carries an
//! optional role-tagged [`Content`] payload made of [`Part`]s, a terminal
//! flag marking the final answer of the run, and optional escalation
//! metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One segment of a content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    FunctionResponse {
        name: String,
        #[serde(default)]
        response: serde_json::Value,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Role-tagged ordered sequence of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// User content with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Model content with a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// All text parts joined in order with no separator.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// Side effects requested by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// The run gave up and handed control back to the caller
    #[serde(default)]
    pub escalate: bool,

    /// Sub-agent the orchestrator delegated to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,

    /// Session state keys written by this event
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub state_delta: serde_json::Map<String, serde_json::Value>,
}

/// One message or step produced by an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Groups the events of one user turn
    pub invocation_id: String,
    /// Agent name, or `user`
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Marks the final answer of the run
    #[serde(default)]
    pub final_response: bool,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an empty, non-terminal event.
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            actions: EventActions::default(),
            error_message: None,
            final_response: false,
            timestamp: Utc::now(),
        }
    }

    /// Attach a content payload.
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Mark this event as the final answer of the run.
    pub fn terminal(mut self) -> Self {
        self.final_response = true;
        self
    }

    /// Mark this event as an escalation with an optional message.
    pub fn escalate(mut self, message: Option<String>) -> Self {
        self.actions.escalate = true;
        self.error_message = message;
        self
    }

    /// Whether this event carries the final answer of the run.
    pub fn is_final_response(&self) -> bool {
        self.final_response
    }

    /// Whether this event signals escalation.
    pub fn is_escalation(&self) -> bool {
        self.actions.escalate
    }

    /// Concatenated text of the content, `None` when there is no content.
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(Content::text)
    }

    /// Whether the content was authored by the user.
    pub fn is_user(&self) -> bool {
        matches!(self.content.as_ref().map(|c| c.role), Some(Role::User))
    }
}
