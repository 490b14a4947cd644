//! Agent response sanitizer.
//!
//! The orchestrator's planner wraps its scratch work in `/*REASONING*/` and
//! `/*FINAL_ANSWER*/` markers, and delegated answers often open with an
//! attribution lead-in such as "The market_validator_agent has provided...".
//! None of this should reach the founder. [`clean`] strips it by running the
//! ordered [`TRANSFORMS`] table until the text stops changing.
//!
//! Malformed markers (`/REASONING` with no closing slash) and the bare word
//! REASONING in prose are left alone.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Regex Patterns
// ============================================================================

static STAR_REASONING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\*REASONING\*/").unwrap());
static STAR_REASONING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*REASONING\*/\s*\n?\s*[^\n]*").unwrap());
static STAR_REASONING_ANY_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/\*REASONING\*/").unwrap());
static SLASH_REASONING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/REASONING\s*/").unwrap());
static SLASH_REASONING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/REASONING\s*/\s*\n?\s*[^\n]*").unwrap());
static SLASH_REASONING_ANY_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/REASONING\s*/").unwrap());
static REASONING_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/REASONING/.*?/FINAL_ANSWER/").unwrap());
static LEAD_IN_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)The\s+`?\s*\w+_agent\s*`?\s+has\s+provided").unwrap()
});
// Sentence rules end at the first period followed by whitespace and never
// cross a line break.
static LEAD_IN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*The\s+`?\s*\w+_agent\s*`?\s+has\s+provided[^\n]*?\.(?:\s+|$)").unwrap()
});
static LEAD_IN_SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)The\s+`?\s*\w+_agent\s*`?\s+has\s+provided[^\n]*?\.(?:\s+|$)").unwrap()
});
static AGENT_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)\b\w+_agent\s+has\s+provided[^\n]*?\.(?:\s+|$)").unwrap()
});

/// Phrases that open the real answer after an attribution lead-in.
const CONTINUATION_PHRASES: &[&str] = &["here are the", "summary:", "your ", "the following"];

// ============================================================================
// Transform Table
// ============================================================================

/// A named cleaning step.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Cleaning steps in application order.
pub const TRANSFORMS: &[Transform] = &[
    Transform {
        name: "final_answer_markers",
        apply: strip_final_answer_markers,
    },
    Transform {
        name: "star_reasoning_paragraph",
        apply: strip_star_reasoning_paragraph,
    },
    Transform {
        name: "star_reasoning_line",
        apply: strip_star_reasoning_line,
    },
    Transform {
        name: "reasoning_span",
        apply: strip_reasoning_span,
    },
    Transform {
        name: "slash_reasoning_paragraph",
        apply: strip_slash_reasoning_paragraph,
    },
    Transform {
        name: "slash_reasoning_line",
        apply: strip_slash_reasoning_line,
    },
    Transform {
        name: "slash_reasoning_markers",
        apply: strip_slash_reasoning_markers,
    },
    Transform {
        name: "trailing_final_answer_markers",
        apply: strip_trailing_final_answer_markers,
    },
    Transform {
        name: "star_reasoning_markers",
        apply: strip_star_reasoning_markers,
    },
    Transform {
        name: "lead_in_paragraph",
        apply: strip_lead_in_paragraph,
    },
    Transform {
        name: "lead_in_line",
        apply: strip_lead_in_line,
    },
    Transform {
        name: "lead_in_sentence",
        apply: strip_lead_in_sentence,
    },
    Transform {
        name: "agent_fragment",
        apply: strip_agent_fragment,
    },
    Transform {
        name: "trim",
        apply: trim,
    },
];

// ============================================================================
// Public API
// ============================================================================

/// Run every transform once, in table order.
pub fn clean_once(text: &str) -> String {
    TRANSFORMS
        .iter()
        .fold(text.to_string(), |acc, transform| (transform.apply)(&acc))
}

/// Strip planner markers and attribution lead-ins from agent output.
///
/// Every transform only removes text, so repeating [`clean_once`] until the
/// output stops changing terminates and makes `clean` idempotent.
pub fn clean(text: &str) -> String {
    let mut current = clean_once(text);
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

// ============================================================================
// Transforms
// ============================================================================

fn strip_final_answer_markers(text: &str) -> String {
    text.replace("/*FINAL_ANSWER*/", "").replace("/FINAL_ANSWER/", "")
}

fn strip_star_reasoning_paragraph(text: &str) -> String {
    strip_marker_paragraphs(text, &STAR_REASONING)
}

fn strip_star_reasoning_line(text: &str) -> String {
    STAR_REASONING_LINE.replace_all(text, "").into_owned()
}

fn strip_reasoning_span(text: &str) -> String {
    REASONING_SPAN.replace_all(text, "").into_owned()
}

fn strip_slash_reasoning_paragraph(text: &str) -> String {
    strip_marker_paragraphs(text, &SLASH_REASONING)
}

fn strip_slash_reasoning_line(text: &str) -> String {
    SLASH_REASONING_LINE.replace_all(text, "").into_owned()
}

fn strip_slash_reasoning_markers(text: &str) -> String {
    SLASH_REASONING_ANY_CASE.replace_all(text, "").into_owned()
}

fn strip_trailing_final_answer_markers(text: &str) -> String {
    text.replace("/FINAL_ANSWER/", "")
}

fn strip_star_reasoning_markers(text: &str) -> String {
    STAR_REASONING_ANY_CASE.replace_all(text, "").into_owned()
}

fn strip_lead_in_paragraph(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut search_from = 0;

    while let Some(head) = LEAD_IN_HEAD.find_at(text, search_from) {
        let end = lead_in_end(text, head.end());
        out.push_str(&text[copied_to..head.start()]);
        copied_to = end;
        search_from = end;
    }

    out.push_str(&text[copied_to..]);
    out
}

fn strip_lead_in_line(text: &str) -> String {
    LEAD_IN_LINE.replace_all(text, "").into_owned()
}

fn strip_lead_in_sentence(text: &str) -> String {
    LEAD_IN_SENTENCE.replace_all(text, "").into_owned()
}

fn strip_agent_fragment(text: &str) -> String {
    AGENT_FRAGMENT.replace_all(text, "").into_owned()
}

fn trim(text: &str) -> String {
    text.trim().to_string()
}

// ============================================================================
// Helpers
// ============================================================================

/// Remove each `marker` occurrence together with the text after it, up to
/// (not including) the next blank line.
///
/// When the marker is followed by whitespace, the first blank line after
/// that whitespace ends the block; failing that, the last blank line inside
/// the whitespace does. A marker with no blank line after it is kept for the
/// line rule.
fn strip_marker_paragraphs(text: &str, marker: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut search_from = 0;

    while let Some(m) = marker.find_at(text, search_from) {
        let body = &text[m.end()..];
        let body_start = m.end();
        let ws_end = body_start + (body.len() - body.trim_start().len());

        let end = text[ws_end..]
            .find("\n\n")
            .map(|i| ws_end + i)
            .or_else(|| text[body_start..ws_end].rfind("\n\n").map(|i| body_start + i));

        match end {
            Some(end) => {
                out.push_str(&text[copied_to..m.start()]);
                copied_to = end;
                search_from = end;
            }
            // markers start with an ASCII '/'
            None => search_from = m.start() + 1,
        }
    }

    out.push_str(&text[copied_to..]);
    out
}

/// End of an attribution lead-in whose head ends at `from`.
///
/// Continuation phrases are only looked for on the lead-in's own line; one
/// that opens a sentence wins over an earlier one inside a sentence. Without
/// a phrase the lead-in runs to the next blank line, and without that it
/// ends at the first sentence end of its line or at the line break.
fn lead_in_end(text: &str, from: usize) -> usize {
    let line_end = text[from..].find('\n').map_or(text.len(), |i| from + i);

    let mut first_phrase = None;
    for (offset, _) in text[from..line_end].char_indices() {
        let pos = from + offset;
        if starts_with_continuation(&text[pos..line_end]) {
            if opens_sentence(&text[..pos]) {
                return pos;
            }
            first_phrase.get_or_insert(pos);
        }
    }
    if let Some(pos) = first_phrase {
        return pos;
    }

    if let Some(i) = text[from..].find("\n\n") {
        return from + i;
    }

    sentence_end(text, from, line_end)
}

/// Position after the first period in `text[from..line_end]` that ends a
/// sentence, including the whitespace after it; `line_end` when none does.
fn sentence_end(text: &str, from: usize, line_end: usize) -> usize {
    let line = &text[from..line_end];
    line.char_indices()
        .find(|&(i, c)| c == '.' && line[i + 1..].chars().next().map_or(true, char::is_whitespace))
        .map(|(i, _)| {
            let after = from + i + 1;
            after + (text[after..].len() - text[after..].trim_start().len())
        })
        .unwrap_or(line_end)
}

fn starts_with_continuation(rest: &str) -> bool {
    CONTINUATION_PHRASES.iter().any(|phrase| {
        rest.get(..phrase.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(phrase))
    })
}

/// Whether a phrase right after `before` starts a sentence or a line.
fn opens_sentence(before: &str) -> bool {
    if before.is_empty() || before.ends_with('\n') {
        return true;
    }
    let trimmed = before.trim_end();
    if trimmed.len() == before.len() {
        return false;
    }
    trimmed.is_empty() || trimmed.ends_with(['.', '!', '?', ':'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn transform(name: &str) -> fn(&str) -> String {
        TRANSFORMS
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.apply)
            .unwrap_or_else(|| panic!("no transform named {name}"))
    }

    #[test]
    fn test_table_order() {
        let names: Vec<&str> = TRANSFORMS.iter().map(|t| t.name).collect();
        assert_eq!(names.first(), Some(&"final_answer_markers"));
        assert_eq!(names.last(), Some(&"trim"));
        let span = names.iter().position(|n| *n == "reasoning_span").unwrap();
        let slash = names.iter().position(|n| *n == "slash_reasoning_paragraph").unwrap();
        let lead_in = names.iter().position(|n| *n == "lead_in_paragraph").unwrap();
        let fragment = names.iter().position(|n| *n == "agent_fragment").unwrap();
        assert!(span < slash);
        assert!(slash < lead_in);
        assert!(lead_in < fragment);
    }

    #[test]
    fn test_final_answer_markers() {
        let apply = transform("final_answer_markers");
        assert_eq!(apply("/*FINAL_ANSWER*/Done"), "Done");
        assert_eq!(apply("/FINAL_ANSWER/Done /FINAL_ANSWER/"), "Done ");
    }

    #[test]
    fn test_star_reasoning_paragraph() {
        let apply = transform("star_reasoning_paragraph");
        assert_eq!(
            apply("/*REASONING*/ internal thought\n\nFinal answer here."),
            "\n\nFinal answer here."
        );
        assert_eq!(
            apply("Intro\n/*REASONING*/ step one\nstep two\n\nAnswer"),
            "Intro\n\n\nAnswer"
        );
    }

    #[test]
    fn test_star_reasoning_paragraph_blank_line_inside_whitespace() {
        let apply = transform("star_reasoning_paragraph");
        assert_eq!(apply("/*REASONING*/\n\n\nAnswer"), "\n\nAnswer");
    }

    #[test]
    fn test_star_reasoning_paragraph_needs_blank_line() {
        let apply = transform("star_reasoning_paragraph");
        let text = "/*REASONING*/ only thought\nAnswer";
        assert_eq!(apply(text), text);
    }

    #[test]
    fn test_star_reasoning_line() {
        let apply = transform("star_reasoning_line");
        assert_eq!(apply("/*REASONING*/ only thought\nAnswer"), "\nAnswer");
        assert_eq!(apply("/*REASONING*/\n  next line\nAnswer"), "\nAnswer");
    }

    #[test]
    fn test_reasoning_span() {
        let apply = transform("reasoning_span");
        assert_eq!(
            apply("/REASONING/ think\nmore /FINAL_ANSWER/The answer"),
            "The answer"
        );
    }

    #[test]
    fn test_slash_reasoning_paragraph_allows_inner_spaces() {
        let apply = transform("slash_reasoning_paragraph");
        assert_eq!(apply("/REASONING / hmm\n\nAnswer"), "\n\nAnswer");
    }

    #[test]
    fn test_slash_reasoning_line() {
        let apply = transform("slash_reasoning_line");
        assert_eq!(apply("/REASONING/ hmm\nAnswer"), "\nAnswer");
    }

    #[test]
    fn test_slash_reasoning_markers_any_case() {
        let apply = transform("slash_reasoning_markers");
        assert_eq!(apply("a /reasoning/ b /Reasoning  / c"), "a  b  c");
    }

    #[test]
    fn test_star_reasoning_markers_any_case() {
        let apply = transform("star_reasoning_markers");
        assert_eq!(apply("a /*reasoning*/ b"), "a  b");
    }

    #[test]
    fn test_lead_in_paragraph_stops_at_continuation() {
        let apply = transform("lead_in_paragraph");
        assert_eq!(
            apply("The market_strategist_agent has provided your next steps. Here are the details: do X, then Y."),
            "Here are the details: do X, then Y."
        );
    }

    #[test]
    fn test_lead_in_paragraph_stops_at_blank_line() {
        let apply = transform("lead_in_paragraph");
        assert_eq!(
            apply("The `gtm_agent` has provided a plan\nfor launch\n\n1. Ship it"),
            "\n\n1. Ship it"
        );
    }

    #[test]
    fn test_lead_in_paragraph_ends_at_sentence_on_its_line() {
        let apply = transform("lead_in_paragraph");
        assert_eq!(apply("The research_agent has provided findings."), "");
        assert_eq!(
            apply("The research_agent has provided 3.5M leads. Call them."),
            "Call them."
        );
        assert_eq!(
            apply("The deck_agent has provided a deck:\nWe help 3.5M dentists"),
            "\nWe help 3.5M dentists"
        );
    }

    #[test]
    fn test_lead_in_paragraph_keeps_phrase_inside_sentence() {
        let apply = transform("lead_in_paragraph");
        assert_eq!(
            apply("The pitch_writer_agent has provided your elevator pitch:\nWe help 3.5M dentists cut no-shows"),
            "your elevator pitch:\nWe help 3.5M dentists cut no-shows"
        );
    }

    #[test]
    fn test_lead_in_paragraph_ignores_phrases_on_later_lines() {
        let apply = transform("lead_in_paragraph");
        assert_eq!(
            apply("The deck_agent has provided a deck:\nWe help dentists. Your pilot starts Monday."),
            "\nWe help dentists. Your pilot starts Monday."
        );
    }

    #[test]
    fn test_lead_in_line() {
        let apply = transform("lead_in_line");
        assert_eq!(
            apply("Intro\n  The doc_agent has provided a draft. Read it."),
            "Intro\nRead it."
        );
    }

    #[test]
    fn test_lead_in_line_stays_on_its_line() {
        let apply = transform("lead_in_line");
        let text = "The pitch_agent has provided a pitch:\nWe help 3.5M dentists";
        assert_eq!(apply(text), text);
    }

    #[test]
    fn test_lead_in_sentence() {
        let apply = transform("lead_in_sentence");
        assert_eq!(
            apply("Great news! The doc_agent has provided a draft. Read it."),
            "Great news! Read it."
        );
    }

    #[test]
    fn test_agent_fragment() {
        let apply = transform("agent_fragment");
        assert_eq!(
            apply("Ok, investor_agent has provided leads. Call them."),
            "Ok, Call them."
        );
    }

    #[test]
    fn test_trim() {
        assert_eq!(transform("trim")("  \n answer \n"), "answer");
    }

    #[test_case("/*REASONING*/ internal thought\n\nFinal answer here.", "Final answer here." ; "reasoning paragraph")]
    #[test_case("/*REASONING*/ plan\n/*FINAL_ANSWER*/\nYour TAM is $4B.", "Your TAM is $4B." ; "reasoning then final answer")]
    #[test_case("/REASONING/ weigh options\n\nGo with B." , "Go with B." ; "slash reasoning paragraph")]
    #[test_case("The market_strategist_agent has provided your next steps. Here are the details: do X, then Y.", "Here are the details: do X, then Y." ; "lead in")]
    #[test_case("The pitch_writer_agent has provided your elevator pitch:\nWe help 3.5M dentists cut no-shows", "your elevator pitch:\nWe help 3.5M dentists cut no-shows" ; "lead in before pitch")]
    #[test_case("The market_strategist_agent has provided the following plan:\n1. Target dentists\n2. Run pilots", "the following plan:\n1. Target dentists\n2. Run pilots" ; "lead in before numbered plan")]
    #[test_case("/*FINAL_ANSWER*/", "" ; "marker only")]
    #[test_case("Plain answer", "Plain answer" ; "untouched")]
    fn test_clean(input: &str, expected: &str) {
        assert_eq!(clean(input), expected);
    }

    #[test]
    fn test_clean_leaves_malformed_markers() {
        assert_eq!(
            clean("The /REASONING without a slash stays."),
            "The /REASONING without a slash stays."
        );
        assert_eq!(
            clean("REASONING about markets is hard."),
            "REASONING about markets is hard."
        );
    }

    #[test]
    fn test_lead_in_your_inside_sentence_is_not_a_terminator() {
        let cleaned = clean("The market_strategist_agent has provided your next steps. Here are the details: do X, then Y.");
        assert!(cleaned.starts_with("Here are the details: do X, then Y."));
    }

    #[test]
    fn test_opens_sentence() {
        assert!(opens_sentence(""));
        assert!(opens_sentence("line\n"));
        assert!(opens_sentence("done. "));
        assert!(opens_sentence("note:\t"));
        assert!(!opens_sentence("provided "));
        assert!(!opens_sentence("steps."));
    }

    fn marker_soup() -> impl Strategy<Value = String> {
        let token = prop_oneof![
            Just("/*REASONING*/".to_string()),
            Just("/REASONING/".to_string()),
            Just("/reasoning /".to_string()),
            Just("/*FINAL_ANSWER*/".to_string()),
            Just("/FINAL_ANSWER/".to_string()),
            Just("The market_agent has provided".to_string()),
            Just("investor_agent has provided".to_string()),
            Just("Here are the".to_string()),
            Just("Summary:".to_string()),
            Just("Your ".to_string()),
            Just("\n\n".to_string()),
            Just("\n".to_string()),
            Just(". ".to_string()),
            "[a-zA-Z ]{0,8}",
        ];
        prop::collection::vec(token, 0..24).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_clean_is_idempotent(text in marker_soup()) {
            let once = clean(&text);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn prop_clean_is_idempotent_on_any_text(text in "(?s).{0,200}") {
            let once = clean(&text);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn prop_clean_removes_planner_markers(text in marker_soup()) {
            let cleaned = clean(&text);
            prop_assert!(!cleaned.contains("/*REASONING*/"));
            prop_assert!(!cleaned.contains("/*FINAL_ANSWER*/"));
            prop_assert!(!cleaned.contains("/FINAL_ANSWER/"));
            prop_assert!(!cleaned.contains("/REASONING/"));
        }
    }
}
