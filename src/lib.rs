//! # depo-toc
//!
//! Build a table of contents for a deposition transcript: where each topic
//! of testimony starts, by page and line.
//!
//! ## How it works
//!
//! Transcript pages carry printed line numbers 1–25, so a topic boundary can
//! be pinned to an exact `(page, line)` anchor. Each page is reduced to its
//! content words with those numbers kept, then an LLM (the topic oracle)
//! is asked where topics begin. Every answer is checked against the page
//! text before it is accepted.
//!
//! ```text
//! transcript (PDF / .txt / URL)
//!  │
//!  ├─ 1. Extract    raw text per page
//!  ├─ 2. Normalize  lower-case, strip timestamps, lemmatise, keep line numbers;
//!  │                stop after the "witness signature" page
//!  ├─ 3. Window     overlapping runs of pages (batch) or single pages (streaming)
//!  ├─ 4. Classify   oracle call per unit, retried with backoff
//!  ├─ 5. Anchor     drop candidates pointing at pages/lines that do not exist
//!  └─ 6. Merge      ordered table, no adjacent duplicate topics
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depo_toc::{build_toc, TocConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TocConfig::default();
//!     let output = build_toc("deposition.pdf", &config).await?;
//!     for entry in &output.entries {
//!         println!("{} (Page {}, Line {})", entry.label, entry.page_start, entry.line_start);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Consolidation modes
//!
//! | Mode | Unit | Calls | Boundary handling |
//! |------|------|-------|-------------------|
//! | `batch` (default) | 8-page window, stride 7 | concurrent | overlap page seen twice, duplicates merged |
//! | `streaming` | one page | sequential, 1 s apart | previous topic passed to the oracle |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `depotoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! depo-toc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod toc;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CancelHandle, ConsolidationMode, PageNumbering, PageSelection, TocConfig, TocConfigBuilder,
};
pub use error::{AnchorRejection, TocError, UnitError};
pub use export::ExportFormat;
pub use output::{DocumentSummary, TocEntry, TocOutput, TocStats, UnitReport, WindowSpan};
pub use pipeline::normalize::{Normalizer, PhraseMarker, RuleNormalizer, TerminalMarker};
pub use pipeline::oracle::{LlmOracle, OracleError, OracleReply, OracleRequest, TopicOracle};
pub use progress::{NoopProgressCallback, ProgressCallback, TocProgressCallback};
pub use stream::{toc_stream, toc_stream_from_pages, UnitStream};
pub use toc::{
    build_toc, build_toc_from_bytes, build_toc_from_pages, build_toc_sync, build_toc_to_files,
    inspect, summarize, write_output, WriteOutcome,
};
