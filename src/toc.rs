//! Eager (whole-transcript) entry points.
//!
//! These wait for every unit, consolidate, and return one [`TocOutput`].
//! Use [`crate::stream::toc_stream`] to observe streaming-mode pages as they
//! are classified.
//!
//! ```text
//! input ─▶ extract ─▶ normalize ─▶ window ─▶ classify ─▶ anchor ─▶ consolidate
//!                         │                   (oracle)
//!                         └─ terminal page ends consumption
//! ```

use crate::config::{ConsolidationMode, TocConfig};
use crate::error::{TocError, UnitError};
use crate::export::{self, ExportFormat};
use crate::output::{DocumentSummary, TocEntry, TocOutput, TocStats, UnitReport, WindowSpan};
use crate::pipeline::anchor;
use crate::pipeline::classify::classify_unit;
use crate::pipeline::consolidate::{consolidator_for, ResolvedEntry};
use crate::pipeline::normalize::{normalize_document, NormalizedPage, PreparedDocument};
use crate::pipeline::oracle::{resolve_oracle, OracleRequest, TopicOracle};
use crate::pipeline::window::{build_windows, uncovered_pages, Window};
use crate::pipeline::{extract, input};
use crate::stream::sequential_stream;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Build the table of contents for a transcript file or URL.
///
/// # Returns
/// `Ok(TocOutput)` whenever the transcript could be read, even if some
/// units failed (check `output.stats.failed_units`) or no topic was found
/// (check [`TocOutput::is_empty`]).
///
/// # Errors
/// Only fatal conditions: the source is unavailable, the configuration is
/// invalid, or no oracle can be constructed.
pub async fn build_toc(
    input_str: impl AsRef<str>,
    config: &TocConfig,
) -> Result<TocOutput, TocError> {
    let input_str = input_str.as_ref();
    info!("Starting {} run: {}", config.mode, input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Oracle ───────────────────────────────────────────────────
    let oracle = resolve_oracle(config)?;

    // ── Step 3: Extract page text ────────────────────────────────────────
    let raw_pages =
        extract::extract_pages(resolved.path(), resolved.format(), config.password.as_deref())
            .await?;
    info!("Read {} pages", raw_pages.len());

    run(raw_pages, oracle, config).await
}

/// Build the table of contents from already extracted page texts.
///
/// `raw_pages[i]` is page `i + 1`; `None` marks a page without text.
pub async fn build_toc_from_pages(
    raw_pages: Vec<Option<String>>,
    config: &TocConfig,
) -> Result<TocOutput, TocError> {
    let oracle = resolve_oracle(config)?;
    run(raw_pages, oracle, config).await
}

/// Build the table of contents from transcript bytes held in memory.
///
/// PDF bytes are recognised by their magic number; anything else is read as
/// a form-feed separated text transcript.
pub async fn build_toc_from_bytes(
    bytes: &[u8],
    config: &TocConfig,
) -> Result<TocOutput, TocError> {
    let suffix = if bytes.starts_with(b"%PDF") { ".pdf" } else { ".txt" };
    let mut tmp = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(|e| TocError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| TocError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `build_toc` returns
    build_toc(&path, config).await
}

/// Synchronous wrapper around [`build_toc`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_toc_sync(
    input_str: impl AsRef<str>,
    config: &TocConfig,
) -> Result<TocOutput, TocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TocError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_toc(input_str, config))
}

/// Result of [`build_toc_to_files`].
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// Artifacts were written.
    Written { paths: Vec<PathBuf>, stats: TocStats },
    /// No topics were generated; nothing was written.
    Empty { stats: TocStats },
}

impl WriteOutcome {
    pub fn stats(&self) -> &TocStats {
        match self {
            WriteOutcome::Written { stats, .. } | WriteOutcome::Empty { stats } => stats,
        }
    }
}

/// Build the table of contents and write one artifact per format, all named
/// `<base>.<ext>`.
///
/// An empty table writes nothing and returns [`WriteOutcome::Empty`].
pub async fn build_toc_to_files(
    input_str: impl AsRef<str>,
    base: impl AsRef<Path>,
    formats: &[ExportFormat],
    config: &TocConfig,
) -> Result<WriteOutcome, TocError> {
    let output = build_toc(input_str, config).await?;
    write_output(&output, base.as_ref(), formats).await
}

/// Write a finished run's artifacts; see [`build_toc_to_files`].
pub async fn write_output(
    output: &TocOutput,
    base: &Path,
    formats: &[ExportFormat],
) -> Result<WriteOutcome, TocError> {
    if output.is_empty() {
        info!("No topics were generated; no files written");
        return Ok(WriteOutcome::Empty {
            stats: output.stats.clone(),
        });
    }
    let paths = export::write_outputs(&output.entries, base, formats).await?;
    Ok(WriteOutcome::Written {
        paths,
        stats: output.stats.clone(),
    })
}

/// Describe what a run would analyse, without calling the oracle.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &TocConfig,
) -> Result<DocumentSummary, TocError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let raw_pages =
        extract::extract_pages(resolved.path(), resolved.format(), config.password.as_deref())
            .await?;
    summarize(&raw_pages, config)
}

/// [`inspect`] over already extracted page texts.
pub fn summarize(
    raw_pages: &[Option<String>],
    config: &TocConfig,
) -> Result<DocumentSummary, TocError> {
    let doc = normalize_document(raw_pages, config)?;
    let (windows, uncovered): (Vec<WindowSpan>, Vec<u32>) = match config.mode {
        ConsolidationMode::Batch => (
            build_windows(&doc.pages, config.window_size, config.stride)
                .iter()
                .map(Window::span)
                .collect(),
            uncovered_pages(&doc.pages, config.window_size, config.stride),
        ),
        ConsolidationMode::Streaming => (Vec::new(), Vec::new()),
    };

    Ok(DocumentSummary {
        source_pages: doc.source_pages,
        text_pages: doc.pages.len(),
        skipped_pages: doc.skipped_pages,
        terminal_page: doc.terminal_page,
        pages_after_terminal: doc.pages_after_terminal,
        windows,
        uncovered_pages: uncovered,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run(
    raw_pages: Vec<Option<String>>,
    oracle: Arc<dyn TopicOracle>,
    config: &TocConfig,
) -> Result<TocOutput, TocError> {
    let total_start = Instant::now();
    let doc = normalize_document(&raw_pages, config)?;
    let mut stats = base_stats(&doc, config.mode);

    let oracle_start = Instant::now();
    let (entries, units) = match config.mode {
        ConsolidationMode::Batch => run_batch(&doc.pages, oracle, config, &mut stats).await,
        ConsolidationMode::Streaming => run_streaming(doc.pages, oracle, config, &mut stats).await,
    };
    stats.oracle_duration_ms = oracle_start.elapsed().as_millis() as u64;

    tally_units(&mut stats, &units);
    stats.entries = entries.len();
    stats.stopped_early |= config.cancel.is_cancelled();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Run complete: {} topics from {} units ({} failed) in {}ms",
        stats.entries, stats.units, stats.failed_units, stats.total_duration_ms
    );

    Ok(TocOutput {
        entries,
        units,
        stats,
    })
}

fn base_stats(doc: &PreparedDocument, mode: ConsolidationMode) -> TocStats {
    TocStats {
        mode,
        source_pages: doc.source_pages,
        text_pages: doc.pages.len(),
        skipped_pages: doc.skipped_pages.clone(),
        terminal_page: doc.terminal_page,
        pages_after_terminal: doc.pages_after_terminal,
        ..Default::default()
    }
}

fn tally_units(stats: &mut TocStats, units: &[UnitReport]) {
    stats.failed_units = units.iter().filter(|u| !u.is_ok()).count();
    stats.candidates = units.iter().map(|u| u.candidates).sum();
    stats.rejected_anchors = units.iter().map(|u| u.rejections.len()).sum();
    stats.total_input_tokens = units.iter().map(|u| u.input_tokens as u64).sum();
    stats.total_output_tokens = units.iter().map(|u| u.output_tokens as u64).sum();
}

/// Classify every window concurrently, then overlap-merge.
async fn run_batch(
    pages: &[Arc<NormalizedPage>],
    oracle: Arc<dyn TopicOracle>,
    config: &TocConfig,
    stats: &mut TocStats,
) -> (Vec<TocEntry>, Vec<UnitReport>) {
    let windows = build_windows(pages, config.window_size, config.stride);
    stats.units = windows.len();
    stats.uncovered_pages = uncovered_pages(pages, config.window_size, config.stride);

    if windows.is_empty() && !pages.is_empty() {
        warn!(
            "{} pages is fewer than one window of {}; nothing to classify",
            pages.len(),
            config.window_size
        );
    } else if !stats.uncovered_pages.is_empty() {
        warn!(
            "Pages {:?} fall after the last full window and are not analysed",
            stats.uncovered_pages
        );
    }
    info!(
        "Built {} windows of {} pages (stride {})",
        windows.len(),
        config.window_size,
        config.stride
    );

    let total = windows.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut results: Vec<(UnitReport, Vec<ResolvedEntry>)> =
        stream::iter(windows.iter().map(|window| {
            let oracle = Arc::clone(&oracle);
            async move { process_window(oracle.as_ref(), window, total, config).await }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    results.sort_by_key(|(report, _)| report.unit_index);

    let mut consolidator = consolidator_for(ConsolidationMode::Batch);
    let mut reports = Vec::with_capacity(results.len());
    for (report, resolved) in results {
        for r in resolved {
            consolidator.offer(r);
        }
        reports.push(report);
    }
    let entries = consolidator.finish();

    stats.stopped_early = reports
        .iter()
        .any(|r| matches!(r.error, Some(UnitError::Cancelled { .. })));

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, entries.len());
    }
    (entries, reports)
}

async fn process_window(
    oracle: &dyn TopicOracle,
    window: &Window,
    total: usize,
    config: &TocConfig,
) -> (UnitReport, Vec<ResolvedEntry>) {
    let pages = window.page_numbers();
    if config.cancel.is_cancelled() {
        return (
            UnitReport::failed(
                window.index,
                pages,
                UnitError::Cancelled { unit: window.index },
            ),
            Vec::new(),
        );
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_unit_start(window.index, total);
    }

    let text = window.text();
    let request = OracleRequest {
        unit_index: window.index,
        window_text: &text,
        prior_topic_label: None,
        mode: ConsolidationMode::Batch,
    };
    let first_page = pages.first().copied().unwrap_or(0);
    let classification = classify_unit(oracle, &request, first_page, config).await;

    let mut report = UnitReport::empty(window.index, pages);
    report.candidates = classification.candidates.len();
    report.input_tokens = classification.input_tokens;
    report.output_tokens = classification.output_tokens;
    report.duration_ms = classification.duration_ms;
    report.retries = classification.retries;
    report.error = classification.error;

    let mut resolved = Vec::with_capacity(classification.candidates.len());
    for (seq, candidate) in classification.candidates.iter().enumerate() {
        match anchor::resolve(candidate, window) {
            Ok(entry) => {
                report.resolved.push(entry.clone());
                resolved.push(ResolvedEntry {
                    entry,
                    window_index: window.index,
                    seq,
                });
            }
            Err(rejection) => {
                warn!("Window {}: anchor rejected: {}", window.index, rejection);
                report.rejections.push(rejection);
            }
        }
    }
    debug!(
        "Window {}: {} candidates, {} resolved",
        window.index,
        report.candidates,
        resolved.len()
    );

    if let Some(ref cb) = config.progress_callback {
        match &report.error {
            None => cb.on_unit_complete(window.index, total, report.candidates),
            Some(e) => cb.on_unit_error(window.index, total, &e.to_string()),
        }
    }
    (report, resolved)
}

/// Classify pages in order, carrying the last topic.
async fn run_streaming(
    pages: Vec<Arc<NormalizedPage>>,
    oracle: Arc<dyn TopicOracle>,
    config: &TocConfig,
    stats: &mut TocStats,
) -> (Vec<TocEntry>, Vec<UnitReport>) {
    let planned = pages.len();
    let reports: Vec<UnitReport> = sequential_stream(pages, oracle, config.clone())
        .collect()
        .await;
    stats.units = reports.len();

    let classified = reports
        .iter()
        .filter(|r| !matches!(r.error, Some(UnitError::Cancelled { .. })))
        .count();
    stats.stopped_early = classified < planned;

    let entries = reports.iter().flat_map(|r| r.resolved.clone()).collect();
    (entries, reports)
}
