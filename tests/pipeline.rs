//! Whole-pipeline tests driven by a scripted topic oracle.
//!
//! No provider or network access is needed: every run plugs a
//! [`ScriptedOracle`] into the config, keyed by unit index (window index in
//! batch mode, page position in streaming mode).

use async_trait::async_trait;
use depo_toc::{
    build_toc, build_toc_from_pages, write_output, AnchorRejection, CancelHandle,
    ConsolidationMode, ExportFormat, OracleError, OracleReply, OracleRequest, TocConfig,
    TocConfigBuilder, TocEntry, TocError, TopicOracle, UnitError, WriteOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedOracle {
    replies: HashMap<usize, String>,
    delays_ms: HashMap<usize, u64>,
    unreachable: HashSet<usize>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn reply(mut self, unit: usize, content: &str) -> Self {
        self.replies.insert(unit, content.to_string());
        self
    }

    fn delay(mut self, unit: usize, ms: u64) -> Self {
        self.delays_ms.insert(unit, ms);
        self
    }

    /// Every call for `unit` fails with a transport error.
    fn unreachable(mut self, unit: usize) -> Self {
        self.unreachable.insert(unit);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicOracle for ScriptedOracle {
    async fn classify(&self, req: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(&ms) = self.delays_ms.get(&req.unit_index) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.unreachable.contains(&req.unit_index) {
            return Err(OracleError::Transport("connection reset by peer".into()));
        }
        let fallback = match req.mode {
            ConsolidationMode::Batch => "[]",
            ConsolidationMode::Streaming => r#"{"boolTopicFound": false}"#,
        };
        let content = self
            .replies
            .get(&req.unit_index)
            .map(String::as_str)
            .unwrap_or(fallback);
        Ok(OracleReply {
            content: content.to_string(),
            input_tokens: 100,
            output_tokens: 10,
        })
    }
}

/// `n` transcript pages of five numbered lines each.
fn transcript(n: usize) -> Vec<Option<String>> {
    (1..=n)
        .map(|p| {
            Some(
                (1..=5)
                    .map(|l| format!("{l} testimony page {p} line {l}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        })
        .collect()
}

/// Pipeline logs for failing tests: `RUST_LOG=depo_toc=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn batch(oracle: Arc<ScriptedOracle>, window: usize, stride: usize) -> TocConfigBuilder {
    init_tracing();
    TocConfig::builder()
        .oracle(oracle)
        .window_size(window)
        .stride(stride)
        .retry_backoff_ms(1)
}

fn streaming(oracle: Arc<ScriptedOracle>) -> TocConfigBuilder {
    init_tracing();
    TocConfig::builder()
        .oracle(oracle)
        .mode(ConsolidationMode::Streaming)
        .call_delay_ms(0)
        .retry_backoff_ms(1)
}

fn anchors(entries: &[TocEntry]) -> Vec<(&str, u32, u32)> {
    entries
        .iter()
        .map(|e| (e.label.as_str(), e.page_start, e.line_start))
        .collect()
}

// ── Batch mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_window_table() {
    let oracle = Arc::new(ScriptedOracle::default().reply(
        0,
        r#"[{"topic": "Case title", "page_start": 1, "line_start": 1},
            {"topic": "Appearances", "page_start": 3, "line_start": 1}]"#,
    ));
    let config = batch(oracle.clone(), 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(3), &config).await.unwrap();

    assert_eq!(
        anchors(&out.entries),
        vec![("Case title", 1, 1), ("Appearances", 3, 1)]
    );
    assert_eq!(out.stats.units, 1);
    assert_eq!(out.stats.failed_units, 0);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn topic_on_overlap_page_is_reported_once() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                0,
                r#"[{"topic": "Direct examination", "page_start": 1, "line_start": 1},
                    {"topic": "Cross-examination", "page_start": 7, "line_start": 3}]"#,
            )
            .reply(
                1,
                r#"```json
[{"topic": "Cross-examination", "page_start": 7, "line_start": 3},
 {"topic": "Redirect", "page_start": 12, "line_start": 2}]
```"#,
            ),
    );
    let config = batch(oracle, 8, 6).build().unwrap();

    let out = build_toc_from_pages(transcript(14), &config).await.unwrap();

    assert_eq!(out.stats.units, 2);
    assert_eq!(
        anchors(&out.entries),
        vec![
            ("Direct examination", 1, 1),
            ("Cross-examination", 7, 3),
            ("Redirect", 12, 2),
        ]
    );
}

#[tokio::test]
async fn truncated_reply_fails_only_its_window() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                0,
                r#"[{"topic": "Background", "page_start": 2, "line_start": 4}]"#,
            )
            .reply(1, r#"[{"topic": "Exhibits", "page_start": 5, "line_s"#),
    );
    let config = batch(oracle.clone(), 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(5), &config).await.unwrap();

    assert_eq!(out.stats.units, 2);
    assert_eq!(out.stats.failed_units, 1);
    assert!(matches!(
        out.units[1].error,
        Some(UnitError::MalformedResponse { unit: 1, .. })
    ));
    assert_eq!(anchors(&out.entries), vec![("Background", 2, 4)]);
    // Malformed replies are not retried.
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn unreachable_window_is_retried_then_excluded() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                1,
                r#"[{"topic": "Damages", "page_start": 4, "line_start": 2}]"#,
            )
            .unreachable(0),
    );
    let config = batch(oracle.clone(), 3, 2).max_retries(2).build().unwrap();

    let out = build_toc_from_pages(transcript(5), &config).await.unwrap();

    assert_eq!(oracle.calls(), 4);
    assert_eq!(out.stats.failed_units, 1);
    assert!(matches!(
        out.units[0].error,
        Some(UnitError::TransportFailure { unit: 0, retries: 2, .. })
    ));
    assert_eq!(anchors(&out.entries), vec![("Damages", 4, 2)]);
}

#[tokio::test]
async fn impossible_anchors_are_rejected() {
    let oracle = Arc::new(ScriptedOracle::default().reply(
        0,
        r#"[{"topic": "Opening", "page_start": 1, "line_start": 2},
            {"topic": "Line too high", "page_start": 2, "line_start": 30},
            {"topic": "Wrong page", "page_start": 9, "line_start": 1},
            {"topic": "Missing line", "page_start": 3, "line_start": 12},
            {"topic": "", "page_start": 3, "line_start": 1}]"#,
    ));
    let config = batch(oracle, 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(3), &config).await.unwrap();

    assert_eq!(anchors(&out.entries), vec![("Opening", 1, 2)]);
    assert_eq!(out.stats.candidates, 5);
    assert_eq!(out.stats.rejected_anchors, 4);

    let rejections = &out.units[0].rejections;
    assert!(matches!(
        rejections[0],
        AnchorRejection::LineOutOfRange { line: 30, .. }
    ));
    assert!(matches!(
        rejections[1],
        AnchorRejection::PageNotInWindow { page: 9, .. }
    ));
    assert!(matches!(
        rejections[2],
        AnchorRejection::LineNotOnPage { page: 3, line: 12, .. }
    ));
    assert!(matches!(rejections[3], AnchorRejection::EmptyLabel { .. }));
    // A rejected candidate does not fail its unit.
    assert_eq!(out.stats.failed_units, 0);
}

#[tokio::test]
async fn table_is_ordered_without_adjacent_duplicates() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                0,
                r#"[{"topic": "Employment", "page_start": 3, "line_start": 2},
                    {"topic": "Education", "page_start": 1, "line_start": 4},
                    {"topic": "Employment", "page_start": 3, "line_start": 5}]"#,
            )
            .reply(
                1,
                r#"[{"topic": "Employment", "page_start": 4, "line_start": 1},
                    {"topic": "Accident", "page_start": 5, "line_start": 3}]"#,
            ),
    );
    let config = batch(oracle, 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(5), &config).await.unwrap();

    assert_eq!(
        anchors(&out.entries),
        vec![("Education", 1, 4), ("Employment", 3, 2), ("Accident", 5, 3)]
    );
    for pair in out.entries.windows(2) {
        assert!(pair[0].anchor() < pair[1].anchor());
        assert_ne!(pair[0].label, pair[1].label);
    }
}

#[tokio::test]
async fn result_does_not_depend_on_completion_order() {
    let script = || {
        ScriptedOracle::default()
            .reply(
                0,
                r#"[{"topic": "Preliminaries", "page_start": 1, "line_start": 1},
                    {"topic": "Medical history", "page_start": 3, "line_start": 4}]"#,
            )
            .reply(
                1,
                r#"[{"topic": "Medical history", "page_start": 3, "line_start": 4},
                    {"topic": "Treatment", "page_start": 4, "line_start": 2}]"#,
            )
            .reply(
                2,
                r#"[{"topic": "Treatment", "page_start": 5, "line_start": 1},
                    {"topic": "Damages", "page_start": 7, "line_start": 3}]"#,
            )
    };

    // First window finishes last.
    let slow_first = Arc::new(script().delay(0, 60));
    let concurrent = batch(slow_first, 3, 2).concurrency(3).build().unwrap();
    let sequential = batch(Arc::new(script()), 3, 2)
        .concurrency(1)
        .build()
        .unwrap();

    let a = build_toc_from_pages(transcript(7), &concurrent).await.unwrap();
    let b = build_toc_from_pages(transcript(7), &sequential).await.unwrap();

    assert_eq!(a.entries, b.entries);
    assert_eq!(
        anchors(&a.entries),
        vec![
            ("Preliminaries", 1, 1),
            ("Medical history", 3, 4),
            ("Treatment", 4, 2),
            ("Damages", 7, 3),
        ]
    );
    let order: Vec<usize> = a.units.iter().map(|u| u.unit_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test]
async fn terminal_page_ends_the_transcript() {
    let mut pages = transcript(5);
    pages[2] = Some("1 reading and signing\n2 witness signature\n3 notary".to_string());

    let oracle = Arc::new(ScriptedOracle::default());
    let config = batch(oracle.clone(), 2, 1).build().unwrap();

    let out = build_toc_from_pages(pages, &config).await.unwrap();

    assert_eq!(out.stats.source_pages, 5);
    assert_eq!(out.stats.text_pages, 3);
    assert_eq!(out.stats.terminal_page, Some(3));
    assert_eq!(out.stats.pages_after_terminal, 2);
    assert_eq!(out.stats.units, 2);
    assert_eq!(oracle.calls(), 2);
    assert!(out.is_empty());
}

#[tokio::test]
async fn trailing_pages_are_reported_uncovered() {
    let oracle = Arc::new(ScriptedOracle::default());
    let config = batch(oracle, 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(6), &config).await.unwrap();

    assert_eq!(out.stats.units, 2);
    assert_eq!(out.stats.uncovered_pages, vec![6]);
}

#[tokio::test]
async fn cancelled_batch_run_is_partial() {
    let cancel = CancelHandle::new();
    cancel.cancel();
    let oracle = Arc::new(ScriptedOracle::default());
    let config = batch(oracle.clone(), 3, 2).cancel(cancel).build().unwrap();

    let out = build_toc_from_pages(transcript(7), &config).await.unwrap();

    assert_eq!(oracle.calls(), 0);
    assert!(out.stats.stopped_early);
    assert!(out
        .units
        .iter()
        .all(|u| matches!(u.error, Some(UnitError::Cancelled { .. }))));
}

// ── Streaming mode ───────────────────────────────────────────────────────────

#[tokio::test]
async fn streaming_commits_topic_changes_in_page_order() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                0,
                r#"{"boolTopicFound": true, "newtopicname": "Preliminaries", "startinglineoftopic": 1}"#,
            )
            .reply(
                1,
                r#"{"boolTopicFound": true, "newtopicname": "Preliminaries", "startinglineoftopic": 3}"#,
            )
            .reply(
                3,
                r#"Here you go: {"boolTopicFound": true, "newtopicname": "Background", "startinglineoftopic": 2}"#,
            ),
    );
    let config = streaming(oracle.clone()).build().unwrap();

    let out = build_toc_from_pages(transcript(4), &config).await.unwrap();

    assert_eq!(
        anchors(&out.entries),
        vec![("Preliminaries", 1, 1), ("Background", 4, 2)]
    );
    assert_eq!(out.stats.units, 4);
    assert_eq!(oracle.calls(), 4);
    assert!(!out.stats.stopped_early);
}

#[tokio::test]
async fn streaming_literal_anchor_must_match_page_text() {
    let oracle = Arc::new(
        ScriptedOracle::default()
            .reply(
                0,
                r#"{"boolTopicFound": true, "newtopicname": "Opening", "startinglineoftopic": "3 Testimony"}"#,
            )
            .reply(
                1,
                r#"{"boolTopicFound": true, "newtopicname": "Objections", "startinglineoftopic": "4 objection to form"}"#,
            ),
    );
    let config = streaming(oracle).build().unwrap();

    let out = build_toc_from_pages(transcript(2), &config).await.unwrap();

    assert_eq!(anchors(&out.entries), vec![("Opening", 1, 3)]);
    assert_eq!(out.stats.rejected_anchors, 1);
    assert!(matches!(
        out.units[1].rejections[0],
        AnchorRejection::LineTextNotFound { page: 2, .. }
    ));
}

#[tokio::test]
async fn streaming_page_budget_limits_calls() {
    let oracle = Arc::new(ScriptedOracle::default());
    let config = streaming(oracle.clone()).page_budget(2).build().unwrap();

    let out = build_toc_from_pages(transcript(5), &config).await.unwrap();

    assert_eq!(oracle.calls(), 2);
    assert!(out.stats.stopped_early);
}

#[tokio::test]
async fn streaming_cancel_stops_before_next_page() {
    let cancel = CancelHandle::new();
    cancel.cancel();
    let oracle = Arc::new(ScriptedOracle::default());
    let config = streaming(oracle.clone()).cancel(cancel).build().unwrap();

    let out = build_toc_from_pages(transcript(3), &config).await.unwrap();

    assert_eq!(oracle.calls(), 0);
    assert!(out.stats.stopped_early);
    assert!(out.is_empty());
}

// ── Files in, files out ──────────────────────────────────────────────────────

#[tokio::test]
async fn text_transcript_to_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("depo.txt");
    let body = transcript(3)
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\x0c");
    std::fs::write(&input, body).unwrap();

    let oracle = Arc::new(ScriptedOracle::default().reply(
        0,
        r#"{"table_of_contents": [{"title": "Stipulations", "page": "2", "line": 3}]}"#,
    ));
    let config = batch(oracle, 3, 2).build().unwrap();

    let out = build_toc(input.to_string_lossy(), &config).await.unwrap();
    assert_eq!(anchors(&out.entries), vec![("Stipulations", 2, 3)]);

    let base = dir.path().join("out").join("depo-toc");
    let outcome = write_output(
        &out,
        &base,
        &[ExportFormat::Json, ExportFormat::Docx, ExportFormat::Markdown],
    )
    .await
    .unwrap();

    let WriteOutcome::Written { paths, stats } = outcome else {
        panic!("expected files to be written");
    };
    assert_eq!(paths.len(), 3);
    assert_eq!(stats.entries, 1);
    assert!(dir.path().join("out/depo-toc.docx").exists());

    let json = std::fs::read_to_string(dir.path().join("out/depo-toc.json")).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["topic"], "Stipulations");
    assert_eq!(parsed[0]["page_start"], 2);
    assert_eq!(parsed[0]["line_start"], 3);

    let md = std::fs::read_to_string(dir.path().join("out/depo-toc.md")).unwrap();
    assert!(md.contains("- **Stipulations** (Page 2, Line 3)"));
}

#[tokio::test]
async fn empty_table_writes_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let config = batch(oracle, 3, 2).build().unwrap();

    let out = build_toc_from_pages(transcript(3), &config).await.unwrap();
    let outcome = write_output(&out, &dir.path().join("toc"), &ExportFormat::ALL)
        .await
        .unwrap();

    assert!(matches!(outcome, WriteOutcome::Empty { .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_transcript_is_fatal() {
    let oracle = Arc::new(ScriptedOracle::default());
    let config = batch(oracle.clone(), 3, 2).build().unwrap();

    let err = build_toc("/nonexistent/depo.pdf", &config).await.unwrap_err();

    assert!(matches!(err, TocError::FileNotFound { .. }));
    assert!(err.is_source_unavailable());
    assert_eq!(oracle.calls(), 0);
}
