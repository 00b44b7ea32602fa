//! Oracle calls with retry, plus tolerant reply parsing.
//!
//! ## Retry Strategy
//!
//! Transport and rate-limit failures are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`); a rate-limit reply that names a
//! retry-after delay waits at least that long. Authentication failures stop
//! immediately. A reply that arrives but cannot be parsed is not retried:
//! the unit contributes zero candidates.
//!
//! ## Reply Parsing
//!
//! Models wrap JSON in fences, add prose around it, return a bare object
//! instead of a one-element array, or wrap the array in an object. All of
//! these are accepted. Items missing a field are skipped individually.

use crate::config::{ConsolidationMode, TocConfig};
use crate::error::UnitError;
use crate::pipeline::oracle::{OracleError, OracleRequest, TopicOracle};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Where a candidate says its topic starts on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRef {
    /// Line number as reported (batch mode). May be out of range.
    Number(i64),
    /// Literal starting text of the line (streaming mode).
    Text(String),
}

/// A topic start proposed by the oracle, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCandidate {
    pub label: String,
    pub page_start: i64,
    pub line: LineRef,
    pub source_window_index: usize,
}

/// Outcome of classifying one unit.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub candidates: Vec<TopicCandidate>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
    pub error: Option<UnitError>,
}

/// Send one request to the oracle and parse its reply.
///
/// `page_hint` is the page number streaming candidates are attached to.
/// Never fails: errors are reported in [`Classification::error`].
pub async fn classify_unit(
    oracle: &dyn TopicOracle,
    request: &OracleRequest<'_>,
    page_hint: u32,
    config: &TocConfig,
) -> Classification {
    let start = Instant::now();
    let unit = request.unit_index;
    let mut last_err: Option<UnitError> = None;
    let mut min_wait_ms = 0u64;
    let mut attempts = 0u32;

    for attempt in 0..=config.max_retries {
        attempts = attempt;
        if attempt > 0 {
            let backoff = (config.retry_backoff_ms * 2u64.pow(attempt - 1)).max(min_wait_ms);
            warn!(
                "Unit {}: retry {}/{} after {}ms",
                unit, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = timeout(
            Duration::from_secs(config.api_timeout_secs),
            oracle.classify(request),
        )
        .await;

        match call {
            Ok(Ok(reply)) => {
                let mut result = Classification {
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    retries: attempt,
                    ..Default::default()
                };
                match parse_reply(&reply.content, request.mode, unit, page_hint) {
                    Ok(candidates) => result.candidates = candidates,
                    Err(detail) => {
                        warn!("Unit {}: malformed oracle response: {}", unit, detail);
                        result.error = Some(UnitError::MalformedResponse { unit, detail });
                    }
                }
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
            Ok(Err(e)) => {
                warn!("Unit {}: attempt {} failed: {}", unit, attempt + 1, e);
                if let OracleError::RateLimited {
                    retry_after_secs: Some(secs),
                    ..
                } = &e
                {
                    min_wait_ms = secs * 1000;
                }
                let retryable = e.is_retryable();
                last_err = Some(UnitError::TransportFailure {
                    unit,
                    retries: attempt,
                    detail: e.to_string(),
                });
                if !retryable {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Unit {}: attempt {} timed out after {}s",
                    unit,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(UnitError::Timeout {
                    unit,
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    Classification {
        retries: attempts,
        duration_ms: start.elapsed().as_millis() as u64,
        error: Some(last_err.unwrap_or_else(|| UnitError::TransportFailure {
            unit,
            retries: attempts,
            detail: "Unknown error".to_string(),
        })),
        ..Default::default()
    }
}

/// Parse a reply according to the mode's reply shape.
pub fn parse_reply(
    content: &str,
    mode: ConsolidationMode,
    unit: usize,
    page_hint: u32,
) -> Result<Vec<TopicCandidate>, String> {
    match mode {
        ConsolidationMode::Batch => parse_batch_reply(content, unit),
        ConsolidationMode::Streaming => {
            Ok(parse_streaming_reply(content, unit, page_hint)?.into_iter().collect())
        }
    }
}

// ── JSON recovery ────────────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n?(.*?)\n?```\s*$").unwrap());

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]}])").unwrap());

/// Locate and parse the outermost JSON value in a chatty reply.
///
/// Whichever of `[` or `{` appears first decides the value's kind; the
/// matching closer is searched from the end. A missing closer means the
/// reply was cut off, which is not recoverable.
fn extract_json(content: &str) -> Result<Value, String> {
    let trimmed = content.trim();
    let body = RE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str());

    let start = body
        .find(['[', '{'])
        .ok_or_else(|| "no JSON value in reply".to_string())?;
    let closer = if body[start..].starts_with('[') { ']' } else { '}' };
    let end = body
        .rfind(closer)
        .filter(|&end| end > start)
        .ok_or_else(|| format!("reply truncated: no closing '{}'", closer))?;

    let slice = &body[start..=end];
    serde_json::from_str(slice).or_else(|first| {
        let repaired = RE_TRAILING_COMMA.replace_all(slice, "$1");
        serde_json::from_str(&repaired).map_err(|_| first.to_string())
    })
}

// ── Batch replies ────────────────────────────────────────────────────────────

const WRAPPER_KEYS: &[&str] = &["topics", "toc", "entries", "table_of_contents"];

/// Parse `[{"topic", "page_start", "line_start"}, …]`.
pub fn parse_batch_reply(content: &str, unit: usize) -> Result<Vec<TopicCandidate>, String> {
    let items = match extract_json(content)? {
        Value::Array(items) => items,
        Value::Object(map) => {
            match WRAPPER_KEYS.iter().find_map(|k| map.get(*k)) {
                Some(Value::Array(items)) => items.clone(),
                _ => vec![Value::Object(map)],
            }
        }
        other => return Err(format!("expected a JSON array, got {}", type_name(&other))),
    };

    let total = items.len();
    let candidates: Vec<TopicCandidate> = items
        .iter()
        .filter_map(|item| batch_item(item, unit))
        .collect();

    if candidates.len() < total {
        debug!(
            "Unit {}: skipped {} malformed item(s) of {}",
            unit,
            total - candidates.len(),
            total
        );
    }
    Ok(candidates)
}

fn batch_item(item: &Value, unit: usize) -> Option<TopicCandidate> {
    let obj = item.as_object()?;
    let label = ["topic", "label", "title"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    let page_start = obj.get("page_start").or_else(|| obj.get("page")).and_then(lenient_int)?;
    let line_start = obj.get("line_start").or_else(|| obj.get("line")).and_then(lenient_int)?;

    Some(TopicCandidate {
        label,
        page_start,
        line: LineRef::Number(line_start),
        source_window_index: unit,
    })
}

/// Integer from a JSON number or a numeric string.
fn lenient_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Streaming replies ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamingReply {
    #[serde(rename = "boolTopicFound", default)]
    found: bool,
    #[serde(rename = "newtopicname", default)]
    name: String,
    #[serde(rename = "startinglineoftopic", default)]
    starting_line: Value,
}

/// Parse `{"boolTopicFound", "newtopicname", "startinglineoftopic"}`.
///
/// `Ok(None)` means the page continues the previous topic.
pub fn parse_streaming_reply(
    content: &str,
    unit: usize,
    page_number: u32,
) -> Result<Option<TopicCandidate>, String> {
    let value = match extract_json(content)? {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    let reply: StreamingReply = serde_json::from_value(value).map_err(|e| e.to_string())?;

    if !reply.found {
        return Ok(None);
    }

    let line = match &reply.starting_line {
        Value::Number(_) => LineRef::Number(lenient_int(&reply.starting_line).unwrap_or(0)),
        Value::String(s) => LineRef::Text(s.trim().to_string()),
        _ => LineRef::Text(String::new()),
    };

    Ok(Some(TopicCandidate {
        label: reply.name.trim().to_string(),
        page_start: page_number as i64,
        line,
        source_window_index: unit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::oracle::OracleReply;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn plain_array() {
        let c = parse_batch_reply(
            r#"[{"topic": "Case title", "page_start": 1, "line_start": 1},
                {"topic": "Appearances", "page_start": 3, "line_start": 1}]"#,
            0,
        )
        .unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].label, "Appearances");
        assert_eq!(c[1].page_start, 3);
        assert_eq!(c[1].line, LineRef::Number(1));
    }

    #[test]
    fn fenced_and_chatty_replies() {
        let fenced = "```json\n[{\"topic\": \"A\", \"page_start\": 2, \"line_start\": 4}]\n```";
        assert_eq!(parse_batch_reply(fenced, 0).unwrap().len(), 1);

        let chatty = "Sure! Here is the list:\n[{\"topic\": \"A\", \"page_start\": 2, \"line_start\": 4}]\nHope it helps.";
        assert_eq!(parse_batch_reply(chatty, 0).unwrap().len(), 1);
    }

    #[test]
    fn bare_object_and_wrapped_array() {
        let bare = r#"{"topic": "A", "page_start": 2, "line_start": 4}"#;
        assert_eq!(parse_batch_reply(bare, 0).unwrap().len(), 1);

        let wrapped = r#"{"topics": [{"topic": "A", "page_start": 2, "line_start": 4},
                                    {"topic": "B", "page_start": 3, "line_start": 9}]}"#;
        assert_eq!(parse_batch_reply(wrapped, 0).unwrap().len(), 2);
    }

    #[test]
    fn bad_items_skipped_good_kept() {
        let c = parse_batch_reply(
            r#"[{"topic": "A", "page_start": "2", "line_start": 4},
                {"topic": "B"},
                "junk",
                {"topic": "C", "page_start": 5, "line_start": 7.0},]"#,
            3,
        )
        .unwrap();
        let labels: Vec<&str> = c.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "C"]);
        assert_eq!(c[0].page_start, 2);
        assert_eq!(c[1].line, LineRef::Number(7));
        assert!(c.iter().all(|c| c.source_window_index == 3));
    }

    #[test]
    fn truncated_reply_is_malformed() {
        let err = parse_batch_reply(r#"[{"topic": "Exhibits", "page_st"#, 0).unwrap_err();
        assert!(err.contains("truncated"), "got: {err}");
        assert!(parse_batch_reply("I could not find any topics.", 0).is_err());
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_batch_reply("[]", 0).unwrap().is_empty());
    }

    #[test]
    fn streaming_found_and_not_found() {
        let found = parse_streaming_reply(
            r#"{"boolTopicFound": true, "newtopicname": "Exhibit 4", "startinglineoftopic": "12 q . mark exhibit 4"}"#,
            5,
            17,
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.label, "Exhibit 4");
        assert_eq!(found.page_start, 17);
        assert_eq!(found.line, LineRef::Text("12 q . mark exhibit 4".into()));

        let none = parse_streaming_reply(
            r#"{"boolTopicFound": false, "newtopicname": "", "startinglineoftopic": ""}"#,
            5,
            17,
        )
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn streaming_numeric_line() {
        let c = parse_streaming_reply(
            r#"{"boolTopicFound": true, "newtopicname": "X", "startinglineoftopic": 9}"#,
            0,
            2,
        )
        .unwrap()
        .unwrap();
        assert_eq!(c.line, LineRef::Number(9));
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: OracleError,
    }

    #[async_trait]
    impl TopicOracle for Flaky {
        async fn classify(&self, _req: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(OracleReply::text(
                    r#"[{"topic": "A", "page_start": 1, "line_start": 1}]"#,
                ))
            }
        }
    }

    fn fast_config() -> TocConfig {
        TocConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn request(text: &str) -> OracleRequest<'_> {
        OracleRequest {
            unit_index: 0,
            window_text: text,
            prior_topic_label: None,
            mode: ConsolidationMode::Batch,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let oracle = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            error: OracleError::Transport("503".into()),
        };
        let result = classify_unit(&oracle, &request("PAGE 1"), 1, &fast_config()).await;
        assert!(result.error.is_none());
        assert_eq!(result.retries, 2);
        assert_eq!(result.candidates.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_unit() {
        let oracle = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
            error: OracleError::Transport("503".into()),
        };
        let result = classify_unit(&oracle, &request("PAGE 1"), 1, &fast_config()).await;
        assert!(matches!(
            result.error,
            Some(UnitError::TransportFailure { retries: 2, .. })
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let oracle = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
            error: OracleError::Auth("401".into()),
        };
        let result = classify_unit(&oracle, &request("PAGE 1"), 1, &fast_config()).await;
        assert!(result.error.is_some());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_retry_hint_sets_minimum_wait() {
        let oracle = Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
            error: OracleError::from_message("429 rate limit reached, please try again in 3s"),
        };
        let started = tokio::time::Instant::now();
        let result = classify_unit(&oracle, &request("PAGE 1"), 1, &fast_config()).await;
        assert!(result.error.is_none());
        assert_eq!(result.retries, 1);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
