//! System prompts for the topic oracle.
//!
//! Every prompt lives here so wording changes touch one file and tests can
//! inspect the instructions without a live model. Callers can override the
//! default via [`crate::config::TocConfig::system_prompt`].

use crate::config::ConsolidationMode;

/// Prompt for batch mode: one window of several pages, JSON array reply.
pub const BATCH_SYSTEM_PROMPT: &str = r#"You index legal deposition transcripts. You receive a window of consecutive transcript pages that have been lower-cased, lemmatised and stripped of stop words.

Input layout:
- Each page begins with a marker line "PAGE <n>".
- Each following line begins with its transcript line number, 1 to 25.

Your task is to list where each discussion topic BEGINS inside this window.

Rules:
1. Locate topic starts using ONLY the PAGE markers and the leading line numbers. Never invent a page that is not in the window. line_start MUST be between 1 and 25.
2. When a topic continues or comes back, reuse the EXACT same label string, character for character and with the same capitalisation.
3. List each topic at most once in this window, at the place where it starts.
4. Labels are short human-readable titles such as "Case title", "Appearances", "Witness background", "Cross-examination".

Reply with JSON ONLY, no prose and no code fences, in exactly this shape:
[
  {"topic": "<label>", "page_start": <int>, "line_start": <int>}
]
Reply with [] when no topic starts in the window."#;

/// Prompt for streaming mode: one page plus the previous topic, JSON object reply.
pub const STREAMING_SYSTEM_PROMPT: &str = r#"You index legal deposition transcripts one page at a time. You receive the next page; each line begins with its transcript line number, 1 to 25. You are also told the last topic that was recorded.

Decide whether a NEW subject begins on this page. Treat minor shifts such as appearances, introductions or exhibit handling as new subjects.

If a new subject begins, reply ONLY with:
{"boolTopicFound": true, "newtopicname": "<short title>", "startinglineoftopic": "<the exact text of the line where it starts, including its line number>"}

If the page continues the last topic, reply ONLY with:
{"boolTopicFound": false, "newtopicname": "", "startinglineoftopic": ""}

Return JSON only. Do not explain."#;

/// Built-in prompt for a consolidation mode.
pub fn system_prompt_for(mode: ConsolidationMode) -> &'static str {
    match mode {
        ConsolidationMode::Batch => BATCH_SYSTEM_PROMPT,
        ConsolidationMode::Streaming => STREAMING_SYSTEM_PROMPT,
    }
}

/// Context message naming the previously accepted topic (streaming mode).
///
/// An empty or absent label means no topic has been recorded yet.
pub fn prior_topic_context(prior_label: Option<&str>) -> String {
    match prior_label {
        Some(label) if !label.trim().is_empty() => {
            format!("Last known topic: \"{}\"", label)
        }
        _ => "Last known topic: none yet (this is the start of the transcript).".to_string(),
    }
}
