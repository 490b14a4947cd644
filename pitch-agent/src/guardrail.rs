//! Keyword guardrail checked before every model call.

use crate::provider::Message;

/// Session state key set when the guardrail blocks a request.
pub const GUARDRAIL_STATE_KEY: &str = "guardrail_block_keyword_triggered";

/// Blocks requests whose latest user message contains a configured keyword.
#[derive(Debug, Clone)]
pub struct KeywordGuardrail {
    keywords: Vec<String>,
}

impl KeywordGuardrail {
    /// Create a guardrail; keywords match case-insensitively.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &pitch_common::AgentConfig) -> Self {
        Self::new(&config.blocked_keywords)
    }

    /// First blocked keyword found in the latest user message, if any.
    pub fn check(&self, messages: &[Message]) -> Option<&str> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user" && !m.content.is_empty())?;
        let upper = last_user.content.to_uppercase();

        self.keywords
            .iter()
            .find(|keyword| upper.contains(keyword.as_str()))
            .map(String::as_str)
    }

    /// Reply sent instead of calling the model.
    pub fn refusal(keyword: &str) -> String {
        format!(
            "I'm sorry, I cannot process this request because it contains the blocked keyword '{keyword}'."
        )
    }
}
