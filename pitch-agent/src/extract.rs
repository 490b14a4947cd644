//! Response extraction.
//!
//! Folds the events of one agent run into a single user-facing answer. The
//! fold is a small state machine driven by [`ExtractionState::step`]:
//!
//! ```text
//! Scanning --terminal, clean text--> Answered
//!     |     --terminal, escalates--> Escalated
//!     |     --terminal, nothing usable--> Draining
//!     '--end of stream--> Exhausted
//!
//! Draining --terminal--> (same rules as Scanning)
//!     |    --any event with clean text--> Answered
//!     '--end of stream--> Exhausted
//! ```

use futures_util::{Stream, StreamExt};

use crate::event::Event;
use crate::sanitize;

/// Answer used when a run ends without anything usable.
pub const NO_FINAL_RESPONSE: &str = "Agent did not produce a final response.";

const ESCALATION_PREFIX: &str = "Agent escalated: ";
const NO_ESCALATION_MESSAGE: &str = "No specific message.";

/// Progress of extracting an answer from an event sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtractionState {
    /// No terminal event seen yet
    #[default]
    Scanning,
    /// A terminal event was seen but yielded nothing usable
    Draining,
    /// Cleaned answer text
    Answered(String),
    /// Escalation message
    Escalated(String),
    /// The stream ended without an answer
    Exhausted,
}

impl ExtractionState {
    /// Advance the state by one event.
    pub fn step(self, event: &Event) -> Self {
        match self {
            Self::Scanning if event.is_final_response() => Self::on_terminal(event),
            Self::Scanning => Self::Scanning,
            Self::Draining if event.is_final_response() => Self::on_terminal(event),
            Self::Draining => match cleaned_text(event) {
                Some(text) => Self::Answered(text),
                None => Self::Draining,
            },
            settled => settled,
        }
    }

    /// Mark the end of the event stream.
    pub fn finish(self) -> Self {
        match self {
            Self::Scanning | Self::Draining => Self::Exhausted,
            settled => settled,
        }
    }

    /// Whether further events can no longer change the outcome.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Answered(_) | Self::Escalated(_) | Self::Exhausted
        )
    }

    /// The answer text for this state; unsettled states give the fallback.
    pub fn into_answer(self) -> String {
        match self {
            Self::Answered(text) | Self::Escalated(text) => text,
            Self::Scanning | Self::Draining | Self::Exhausted => NO_FINAL_RESPONSE.to_string(),
        }
    }

    fn on_terminal(event: &Event) -> Self {
        if let Some(text) = cleaned_text(event) {
            return Self::Answered(text);
        }
        if event.is_escalation() {
            let message = event
                .error_message
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(NO_ESCALATION_MESSAGE);
            return Self::Escalated(format!("{ESCALATION_PREFIX}{message}"));
        }
        Self::Draining
    }
}

fn cleaned_text(event: &Event) -> Option<String> {
    event
        .text()
        .map(|text| sanitize::clean(&text))
        .filter(|text| !text.is_empty())
}

/// Extract the answer from an in-memory event sequence.
pub fn extract_response<'a, I>(events: I) -> String
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut state = ExtractionState::Scanning;
    for event in events {
        state = state.step(event);
        if state.is_settled() {
            break;
        }
    }
    state.finish().into_answer()
}

/// Extract the answer from an event stream, stopping as soon as it settles.
pub async fn extract_response_stream<S>(events: S) -> String
where
    S: Stream<Item = Event>,
{
    futures_util::pin_mut!(events);

    let mut state = ExtractionState::Scanning;
    while let Some(event) = events.next().await {
        state = state.step(&event);
        if state.is_settled() {
            break;
        }
    }

    tracing::debug!(state = ?state, "Extraction finished");
    state.finish().into_answer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Content, Event};
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn step_event(text: &str) -> Event {
        Event::new("inv", "pitchmate_agent").with_content(Content::model(text))
    }

    fn terminal(text: &str) -> Event {
        step_event(text).terminal()
    }

    #[test]
    fn test_no_terminal_event_gives_fallback() {
        let events = vec![step_event("thinking"), step_event("still thinking")];
        assert_eq!(extract_response(&events), NO_FINAL_RESPONSE);
        assert_eq!(extract_response(&Vec::<Event>::new()), NO_FINAL_RESPONSE);
    }

    #[test]
    fn test_terminal_text_is_cleaned() {
        let events = vec![
            Event::new("inv", "user").with_content(Content::user("hi")),
            terminal("/*REASONING*/ internal thought\n\nFinal answer here."),
        ];
        assert_eq!(extract_response(&events), "Final answer here.");
    }

    #[test]
    fn test_first_terminal_event_wins() {
        let events = vec![terminal("first"), terminal("second")];
        assert_eq!(extract_response(&events), "first");
    }

    #[test]
    fn test_escalation_with_message() {
        let events = vec![Event::new("inv", "pitchmate_agent")
            .terminal()
            .escalate(Some("rate limited".into()))];
        assert_eq!(extract_response(&events), "Agent escalated: rate limited");
    }

    #[test]
    fn test_escalation_without_message() {
        let events = vec![Event::new("inv", "pitchmate_agent")
            .terminal()
            .escalate(Some(String::new()))];
        assert_eq!(
            extract_response(&events),
            "Agent escalated: No specific message."
        );
    }

    #[test]
    fn test_content_takes_precedence_over_escalation() {
        let events = vec![terminal("Here you go").escalate(Some("ignored".into()))];
        assert_eq!(extract_response(&events), "Here you go");
    }

    #[test]
    fn test_escalation_message_is_not_cleaned() {
        let events = vec![terminal("/*FINAL_ANSWER*/")
            .escalate(Some("/*REASONING*/ quota".into()))];
        assert_eq!(
            extract_response(&events),
            "Agent escalated: /*REASONING*/ quota"
        );
    }

    #[test]
    fn test_marker_only_terminal_falls_back() {
        let events = vec![terminal("/*FINAL_ANSWER*/")];
        assert_eq!(extract_response(&events), NO_FINAL_RESPONSE);
    }

    #[test]
    fn test_draining_takes_next_usable_event() {
        let events = vec![terminal("/*FINAL_ANSWER*/"), step_event("  "), step_event("Late answer")];
        assert_eq!(extract_response(&events), "Late answer");
    }

    #[test]
    fn test_draining_honours_later_escalation() {
        let events = vec![
            terminal("/*FINAL_ANSWER*/"),
            Event::new("inv", "pitchmate_agent")
                .terminal()
                .escalate(None),
        ];
        assert_eq!(
            extract_response(&events),
            "Agent escalated: No specific message."
        );
    }

    #[test]
    fn test_state_transitions() {
        let state = ExtractionState::default();
        assert_eq!(state, ExtractionState::Scanning);

        let state = state.step(&step_event("not yet"));
        assert_eq!(state, ExtractionState::Scanning);

        let state = state.step(&terminal("/FINAL_ANSWER/"));
        assert_eq!(state, ExtractionState::Draining);
        assert!(!state.is_settled());

        let state = state.step(&step_event("Answer"));
        assert_eq!(state, ExtractionState::Answered("Answer".into()));
        assert!(state.is_settled());

        let state = state.step(&terminal("ignored"));
        assert_eq!(state, ExtractionState::Answered("Answer".into()));
        assert_eq!(ExtractionState::Draining.finish(), ExtractionState::Exhausted);
    }

    #[tokio::test]
    async fn test_stream_matches_slice() {
        let events = vec![
            step_event("plan"),
            terminal("The market_strategist_agent has provided your next steps. Here are the details: do X, then Y."),
        ];
        let from_slice = extract_response(&events);
        let from_stream = extract_response_stream(stream::iter(events)).await;
        assert_eq!(from_slice, from_stream);
        assert!(from_stream.starts_with("Here are the details: do X, then Y."));
    }

    #[tokio::test]
    async fn test_stream_stops_polling_once_settled() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let events = stream::iter(vec![step_event("a"), terminal("done"), step_event("b"), step_event("c")])
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(extract_response_stream(events).await, "done");
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let answer = extract_response_stream(stream::empty::<Event>()).await;
        assert_eq!(answer, NO_FINAL_RESPONSE);
    }
}
