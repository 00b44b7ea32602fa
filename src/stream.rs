//! Streaming mode: classify one page at a time, carrying the last topic.
//!
//! [`toc_stream`] yields a [`UnitReport`] per page as soon as the oracle has
//! answered for it. Pages are sent strictly in order, one call at a time,
//! with `call_delay_ms` between calls. Each report's `resolved` field holds
//! the entries committed for that page, so concatenating them in stream
//! order gives the table of contents so far.
//!
//! The stream ends after the last page, when the page budget is spent, or
//! after the report for the page at which cancellation was noticed.

use crate::config::{ConsolidationMode, TocConfig};
use crate::error::{TocError, UnitError};
use crate::output::UnitReport;
use crate::pipeline::anchor;
use crate::pipeline::classify::classify_unit;
use crate::pipeline::consolidate::{consolidator_for, Consolidator, ResolvedEntry};
use crate::pipeline::normalize::{normalize_document, NormalizedPage};
use crate::pipeline::oracle::{resolve_oracle, OracleRequest, TopicOracle};
use crate::pipeline::window::Window;
use crate::pipeline::{extract, input};
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of per-page reports.
pub type UnitStream = Pin<Box<dyn Stream<Item = UnitReport> + Send>>;

/// Build a table of contents page by page, streaming reports as they land.
///
/// The configured mode is ignored: this entry point always runs the
/// sequential strategy.
///
/// # Returns
/// - `Ok(UnitStream)`: one [`UnitReport`] per classified page
/// - `Err(TocError)`: fatal error (source unavailable, provider not configured, …)
pub async fn toc_stream(
    input_str: impl AsRef<str>,
    config: &TocConfig,
) -> Result<UnitStream, TocError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming run: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let oracle = resolve_oracle(config)?;
    let raw_pages =
        extract::extract_pages(resolved.path(), resolved.format(), config.password.as_deref())
            .await?;

    toc_stream_with(raw_pages, oracle, config)
}

/// [`toc_stream`] over already extracted page texts.
pub fn toc_stream_from_pages(
    raw_pages: Vec<Option<String>>,
    config: &TocConfig,
) -> Result<UnitStream, TocError> {
    let oracle = resolve_oracle(config)?;
    toc_stream_with(raw_pages, oracle, config)
}

fn toc_stream_with(
    raw_pages: Vec<Option<String>>,
    oracle: Arc<dyn TopicOracle>,
    config: &TocConfig,
) -> Result<UnitStream, TocError> {
    let doc = normalize_document(&raw_pages, config)?;
    Ok(sequential_stream(doc.pages, oracle, config.clone()))
}

struct SequentialRun {
    pages: std::vec::IntoIter<Arc<NormalizedPage>>,
    position: usize,
    total: usize,
    calls: usize,
    stop: bool,
    finished: bool,
    oracle: Arc<dyn TopicOracle>,
    consolidator: Box<dyn Consolidator>,
    config: TocConfig,
}

impl SequentialRun {
    /// Next page to classify, or `None` when the run is over.
    fn next_page(&mut self) -> Option<Arc<NormalizedPage>> {
        if self.stop {
            return None;
        }
        if let Some(budget) = self.config.page_budget {
            if self.calls >= budget && self.position < self.total {
                info!(
                    "Page budget of {} calls spent; stopping before page {} of {}",
                    budget,
                    self.position + 1,
                    self.total
                );
                return None;
            }
        }
        self.pages.next()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let entries = self.consolidator.finish().len();
        info!(
            "Streaming run complete: {} of {} pages classified, {} topics",
            self.calls, self.total, entries
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(self.total, entries);
        }
    }
}

/// The sequential loop behind streaming mode, as a stream.
pub(crate) fn sequential_stream(
    pages: Vec<Arc<NormalizedPage>>,
    oracle: Arc<dyn TopicOracle>,
    config: TocConfig,
) -> UnitStream {
    let total = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let run = SequentialRun {
        pages: pages.into_iter(),
        position: 0,
        total,
        calls: 0,
        stop: false,
        finished: false,
        oracle,
        consolidator: consolidator_for(ConsolidationMode::Streaming),
        config,
    };

    Box::pin(stream::unfold(run, |mut run| async move {
        let Some(page) = run.next_page() else {
            run.finish();
            return None;
        };
        let position = run.position;
        run.position += 1;

        if run.calls > 0 && run.config.call_delay_ms > 0 {
            sleep(Duration::from_millis(run.config.call_delay_ms)).await;
        }

        if run.config.cancel.is_cancelled() {
            warn!("Cancelled before page {}", page.page_number);
            run.stop = true;
            let report = UnitReport::failed(
                position,
                vec![page.page_number],
                UnitError::Cancelled { unit: position },
            );
            return Some((report, run));
        }

        let report = classify_page(&mut run, position, page).await;
        Some((report, run))
    }))
}

async fn classify_page(
    run: &mut SequentialRun,
    position: usize,
    page: Arc<NormalizedPage>,
) -> UnitReport {
    let total = run.total;
    if let Some(ref cb) = run.config.progress_callback {
        cb.on_unit_start(position, total);
    }

    let prior = run.consolidator.last_topic().map(str::to_string);
    let text = page.text().to_string();
    let request = OracleRequest {
        unit_index: position,
        window_text: &text,
        prior_topic_label: prior.as_deref(),
        mode: ConsolidationMode::Streaming,
    };
    let classification =
        classify_unit(run.oracle.as_ref(), &request, page.page_number, &run.config).await;
    run.calls += 1;

    let mut report = UnitReport::empty(position, vec![page.page_number]);
    report.candidates = classification.candidates.len();
    report.input_tokens = classification.input_tokens;
    report.output_tokens = classification.output_tokens;
    report.duration_ms = classification.duration_ms;
    report.retries = classification.retries;
    report.error = classification.error;

    let window = Window {
        index: position,
        pages: vec![page],
    };
    for (seq, candidate) in classification.candidates.iter().enumerate() {
        match anchor::resolve(candidate, &window) {
            Ok(entry) => {
                let offered = ResolvedEntry {
                    entry,
                    window_index: position,
                    seq,
                };
                if let Some(committed) = run.consolidator.offer(offered) {
                    report.resolved.push(committed);
                }
            }
            Err(rejection) => {
                warn!("Page {}: anchor rejected: {}", window.pages[0].page_number, rejection);
                report.rejections.push(rejection);
            }
        }
    }

    if let Some(ref cb) = run.config.progress_callback {
        match &report.error {
            None => cb.on_unit_complete(position, total, report.candidates),
            Some(e) => cb.on_unit_error(position, total, &e.to_string()),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TocConfigBuilder;
    use crate::pipeline::oracle::{OracleError, OracleReply};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Reports a new topic on every page, named after the page.
    #[derive(Default)]
    struct PerPage {
        priors: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TopicOracle for PerPage {
        async fn classify(&self, req: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.priors
                .lock()
                .unwrap()
                .push(req.prior_topic_label.map(str::to_string));
            Ok(OracleReply::text(format!(
                r#"{{"boolTopicFound": true, "newtopicname": "Topic {}", "startinglineoftopic": "1"}}"#,
                req.unit_index
            )))
        }
    }

    fn pages(n: usize) -> Vec<Option<String>> {
        (1..=n).map(|i| Some(format!("1 question {i}\n2 answer {i}"))).collect()
    }

    fn config(oracle: Arc<PerPage>) -> TocConfigBuilder {
        TocConfig::builder().oracle(oracle).call_delay_ms(0)
    }

    #[tokio::test]
    async fn prior_topic_is_carried_forward() {
        let oracle = Arc::new(PerPage::default());
        let cfg = config(oracle.clone()).build().unwrap();
        let reports: Vec<UnitReport> = toc_stream_from_pages(pages(3), &cfg)
            .unwrap()
            .collect()
            .await;

        assert_eq!(reports.len(), 3);
        let priors = oracle.priors.lock().unwrap().clone();
        assert_eq!(
            priors,
            vec![None, Some("Topic 0".into()), Some("Topic 1".into())]
        );
        assert_eq!(reports[2].resolved[0].label, "Topic 2");
    }

    #[tokio::test]
    async fn page_budget_stops_the_stream() {
        let oracle = Arc::new(PerPage::default());
        let cfg = config(oracle.clone()).page_budget(2).build().unwrap();
        let reports: Vec<UnitReport> = toc_stream_from_pages(pages(5), &cfg)
            .unwrap()
            .collect()
            .await;
        assert_eq!(reports.len(), 2);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_at_page_boundary() {
        let oracle = Arc::new(PerPage::default());
        let cfg = config(oracle.clone()).build().unwrap();
        let mut s = toc_stream_from_pages(pages(4), &cfg).unwrap();

        let first = s.next().await.unwrap();
        assert!(first.is_ok());
        cfg.cancel.cancel();

        let second = s.next().await.unwrap();
        assert!(matches!(second.error, Some(UnitError::Cancelled { unit: 1 })));
        assert!(s.next().await.is_none());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }
}
