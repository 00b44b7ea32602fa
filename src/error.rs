//! Error types for the depo-toc library.
//!
//! Three distinct types reflect three distinct failure modes:
//!
//! * [`TocError`]: **Fatal**: the run cannot proceed at all (missing input,
//!   unreadable PDF, provider not configured, invalid configuration).
//!   Returned as `Err(TocError)` from the top-level `build_toc*` functions.
//!
//! * [`UnitError`]: **Non-fatal**: one window (batch mode) or one page
//!   (streaming mode) failed, but every other unit is fine. Stored inside
//!   [`crate::output::UnitReport`] so the table is built from whatever
//!   succeeded.
//!
//! * [`AnchorRejection`]: a single topic candidate pointed at a page or line
//!   that does not exist. The candidate is dropped and the reason recorded;
//!   it is never surfaced to the user as an error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the depo-toc library.
#[derive(Debug, Error)]
pub enum TocError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Transcript not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file is neither a PDF nor a plain-text transcript.
    #[error("Unsupported transcript format: '{path}'\nExpected a PDF or a UTF-8 .txt file.")]
    UnsupportedFormat { path: PathBuf },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium on the library search path."
    )]
    PdfiumBindingFailed(String),

    /// The page selection does not intersect the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Oracle setup errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TocError {
    /// `true` for every error meaning the source transcript could not be
    /// read at all.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            TocError::FileNotFound { .. }
                | TocError::PermissionDenied { .. }
                | TocError::InvalidInput { .. }
                | TocError::DownloadFailed { .. }
                | TocError::DownloadTimeout { .. }
                | TocError::UnsupportedFormat { .. }
                | TocError::CorruptPdf { .. }
                | TocError::PasswordRequired { .. }
                | TocError::WrongPassword { .. }
                | TocError::PdfiumBindingFailed(_)
        )
    }
}

/// A non-fatal error for a single analysis unit (window or page).
///
/// The run continues; the unit simply contributes no topics.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The page yielded no extractable text.
    #[error("Page {page}: no extractable text")]
    PageUnextractable { page: u32 },

    /// The oracle replied, but not with parseable structured data.
    #[error("Unit {unit}: malformed oracle response: {detail}")]
    MalformedResponse { unit: usize, detail: String },

    /// Network, quota or provider failure after all retries.
    #[error("Unit {unit}: oracle call failed after {retries} retries: {detail}")]
    TransportFailure {
        unit: usize,
        retries: u32,
        detail: String,
    },

    /// The oracle call exceeded the per-call timeout on every attempt.
    #[error("Unit {unit}: oracle call timed out after {secs}s")]
    Timeout { unit: usize, secs: u64 },

    /// The run was cancelled before this unit was submitted.
    #[error("Unit {unit}: cancelled before submission")]
    Cancelled { unit: usize },
}

/// Why a topic candidate's anchor was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AnchorRejection {
    /// Line number outside the 1..=25 transcript numbering.
    #[error("'{label}': line {line} is outside 1..=25")]
    LineOutOfRange { label: String, line: i64 },

    /// The page is not one of the window's member pages.
    #[error("'{label}': page {page} is not part of window {window}")]
    PageNotInWindow {
        label: String,
        page: i64,
        window: usize,
    },

    /// The line number is in range but the page has no such line.
    #[error("'{label}': page {page} has no line {line}")]
    LineNotOnPage { label: String, page: u32, line: u32 },

    /// No line of the page starts with the reported text.
    #[error("'{label}': no line on page {page} starts with {text:?}")]
    LineTextNotFound {
        label: String,
        page: u32,
        text: String,
    },

    /// The candidate carries a blank label.
    #[error("candidate on page {page} has an empty label")]
    EmptyLabel { page: i64 },
}
