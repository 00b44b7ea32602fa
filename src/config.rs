//! Configuration types for table-of-contents generation.
//!
//! All run behaviour is controlled through [`TocConfig`], built via its
//! [`TocConfigBuilder`]. Every collaborator the pipeline talks to (the
//! oracle, the LLM provider, the terminal-page predicate, the progress sink)
//! is an explicit field here, so one config value scopes one run.

use crate::error::TocError;
use crate::pipeline::normalize::{Normalizer, PhraseMarker, TerminalMarker};
use crate::pipeline::oracle::TopicOracle;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for a table-of-contents run.
///
/// Built via [`TocConfig::builder()`] or using [`TocConfig::default()`].
///
/// # Example
/// ```rust
/// use depo_toc::{ConsolidationMode, TocConfig};
///
/// let config = TocConfig::builder()
///     .window_size(8)
///     .stride(7)
///     .concurrency(4)
///     .mode(ConsolidationMode::Batch)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TocConfig {
    /// Consolidation strategy. Default: [`ConsolidationMode::Batch`].
    pub mode: ConsolidationMode,

    /// Pages per analysis window (batch mode). Default: 8.
    ///
    /// Eight transcript pages of normalised text fit comfortably in a single
    /// classification pass while still giving the oracle enough context to
    /// see where a line of questioning starts and stops.
    pub window_size: usize,

    /// Page offset between consecutive windows (batch mode). Default: 7.
    ///
    /// Must be smaller than `window_size` so adjacent windows share at least
    /// one page; a topic starting on the tail page of one window is observed
    /// again at the head of the next.
    pub stride: usize,

    /// Number of concurrent oracle calls in batch mode. Default: 4.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed topic oracle. Takes precedence over every provider
    /// setting; this is how tests substitute a scripted stub.
    pub oracle: Option<Arc<dyn TopicOracle>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the oracle may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transport failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Delay between consecutive oracle calls in streaming mode. Default: 1000.
    pub call_delay_ms: u64,

    /// Per-call oracle timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Maximum number of oracle calls in streaming mode. Default: unlimited.
    pub page_budget: Option<usize>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Where page numbers come from. Default: [`PageNumbering::Sequential`].
    pub page_numbering: PageNumbering,

    /// End-of-transcript predicate. Default: the phrase "witness signature".
    pub terminal_marker: Arc<dyn TerminalMarker>,

    /// Custom page normaliser. If None, a rule-based normaliser using
    /// `terminal_marker` is used.
    pub normalizer: Option<Arc<dyn Normalizer>>,

    /// Custom system prompt. If None, uses the built-in prompt for `mode`.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag, checked at every unit boundary.
    pub cancel: CancelHandle,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            mode: ConsolidationMode::default(),
            window_size: 8,
            stride: 7,
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            oracle: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            call_delay_ms: 1000,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            page_budget: None,
            pages: PageSelection::default(),
            page_numbering: PageNumbering::default(),
            terminal_marker: Arc::new(PhraseMarker::default()),
            normalizer: None,
            system_prompt: None,
            password: None,
            progress_callback: None,
            cancel: CancelHandle::default(),
        }
    }
}

impl fmt::Debug for TocConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TocConfig")
            .field("mode", &self.mode)
            .field("window_size", &self.window_size)
            .field("stride", &self.stride)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("oracle", &self.oracle.as_ref().map(|_| "<dyn TopicOracle>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("call_delay_ms", &self.call_delay_ms)
            .field("page_budget", &self.page_budget)
            .field("pages", &self.pages)
            .field("page_numbering", &self.page_numbering)
            .finish()
    }
}

impl TocConfig {
    /// Create a new builder for `TocConfig`.
    pub fn builder() -> TocConfigBuilder {
        TocConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pages shared by two consecutive windows.
    pub fn overlap(&self) -> usize {
        self.window_size.saturating_sub(self.stride)
    }
}

/// Builder for [`TocConfig`].
pub struct TocConfigBuilder {
    config: TocConfig,
}

impl TocConfigBuilder {
    pub fn mode(mut self, mode: ConsolidationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn window_size(mut self, n: usize) -> Self {
        self.config.window_size = n;
        self
    }

    pub fn stride(mut self, n: usize) -> Self {
        self.config.stride = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn TopicOracle>) -> Self {
        self.config.oracle = Some(oracle);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn call_delay_ms(mut self, ms: u64) -> Self {
        self.config.call_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn page_budget(mut self, calls: usize) -> Self {
        self.config.page_budget = Some(calls);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_numbering(mut self, numbering: PageNumbering) -> Self {
        self.config.page_numbering = numbering;
        self
    }

    pub fn terminal_marker(mut self, marker: Arc<dyn TerminalMarker>) -> Self {
        self.config.terminal_marker = marker;
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.config.normalizer = Some(normalizer);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, handle: CancelHandle) -> Self {
        self.config.cancel = handle;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TocConfig, TocError> {
        let c = &self.config;
        if c.window_size == 0 {
            return Err(TocError::InvalidConfig(
                "Window size must be ≥ 1".into(),
            ));
        }
        if c.stride == 0 || c.stride >= c.window_size {
            return Err(TocError::InvalidConfig(format!(
                "Stride must satisfy 0 < stride < window size, got stride {} with window size {}",
                c.stride, c.window_size
            )));
        }
        if c.concurrency == 0 {
            return Err(TocError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.page_budget == Some(0) {
            return Err(TocError::InvalidConfig("Page budget must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

impl fmt::Debug for TocConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TocConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How per-unit topic candidates become one table of contents.
///
/// | Mode | Unit | Oracle context | Calls |
/// |------|------|----------------|-------|
/// | `Batch` | overlapping window of pages | none; overlap re-observes boundaries | concurrent |
/// | `Streaming` | one page | previous accepted topic label | sequential, rate-limited |
///
/// Batch mode corrects itself at window seams because the overlap page is
/// classified twice. Streaming mode relies entirely on the oracle noticing a
/// topic change on the page where it happens; a missed change merges two
/// topics for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationMode {
    /// Overlap-merge over concurrent windows. (default)
    #[default]
    Batch,
    /// Sequential page-by-page classification carrying the last topic.
    Streaming,
}

impl fmt::Display for ConsolidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationMode::Batch => f.write_str("batch"),
            ConsolidationMode::Streaming => f.write_str("streaming"),
        }
    }
}

/// Where each page's number comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageNumbering {
    /// 1-based position in the source document. (default)
    #[default]
    Sequential,
    /// The "Page N" label printed on the page, falling back to the position
    /// when no label is found.
    Printed,
}

/// Specifies which pages of the transcript to read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Read all pages (default).
    #[default]
    All,
    /// Read a single page (1-indexed).
    Single(usize),
    /// Read a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Read specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Shared cancellation flag.
///
/// Cloning yields a handle to the same flag. Once cancelled, units that have
/// not started are skipped and the run returns what was already accepted.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
