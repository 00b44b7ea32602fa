//! Page normalisation: raw transcript text → compact, line-numbered text.
//!
//! The oracle only ever sees normalised text, so every anchor it reports
//! must refer to a line that exists here. A page is reduced in this order:
//!
//! 1. Lower-case; detect the end-of-transcript marker on the lowered text
//! 2. Strip `HH:MM` timestamps and running "page N" footers
//! 3. Split into transcript lines by their leading 1–2 digit number
//! 4. Tokenise, tag roles, lemmatise, drop closed-class and stop words
//! 5. Render as `PAGE <n>` followed by one `<line> <text>` row per line
//!
//! [`normalize_document`] applies the page selection and numbering policy
//! and stops consuming pages after the terminal page.

use crate::config::{PageNumbering, PageSelection, TocConfig};
use crate::error::TocError;
use crate::pipeline::lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transcript lines per page.
pub const LINES_PER_PAGE: u32 = 25;

/// Decides whether a page marks the end of the testimony.
///
/// Receives the lower-cased raw text of the page.
pub trait TerminalMarker: Send + Sync {
    fn is_terminal(&self, lowered: &str) -> bool;
}

/// Terminal marker matching any of a set of phrases.
#[derive(Debug, Clone)]
pub struct PhraseMarker {
    phrases: Vec<String>,
}

impl PhraseMarker {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }
}

impl Default for PhraseMarker {
    fn default() -> Self {
        Self::new(["witness signature"])
    }
}

impl TerminalMarker for PhraseMarker {
    fn is_terminal(&self, lowered: &str) -> bool {
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

/// One numbered transcript line after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub number: u32,
    pub text: String,
}

/// A page ready for windowing. Immutable once built; the rendered text is
/// computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPage {
    pub page_number: u32,
    pub lines: Vec<NormalizedLine>,
    pub is_terminal: bool,
    text: String,
}

impl NormalizedPage {
    pub fn new(page_number: u32, lines: Vec<NormalizedLine>, is_terminal: bool) -> Self {
        let mut text = page_marker(page_number);
        for line in &lines {
            text.push('\n');
            if line.text.is_empty() {
                text.push_str(&line.number.to_string());
            } else {
                text.push_str(&format!("{} {}", line.number, line.text));
            }
        }
        Self {
            page_number,
            lines,
            is_terminal,
            text,
        }
    }

    /// Rendered text, starting with the page marker.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line(&self, number: u32) -> Option<&NormalizedLine> {
        self.lines.iter().find(|l| l.number == number)
    }
}

/// Marker line that opens every page's text.
pub fn page_marker(page_number: u32) -> String {
    format!("PAGE {}", page_number)
}

/// Turns one page of raw text into a [`NormalizedPage`].
///
/// Returns `None` when the page has no usable text.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str, page_number: u32) -> Option<NormalizedPage>;
}

/// Rule-based normaliser: regex cleanup plus a word-list lemmatiser.
#[derive(Clone)]
pub struct RuleNormalizer {
    marker: Arc<dyn TerminalMarker>,
}

impl RuleNormalizer {
    pub fn new(marker: Arc<dyn TerminalMarker>) -> Self {
        Self { marker }
    }
}

impl Default for RuleNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(PhraseMarker::default()))
    }
}

impl Normalizer for RuleNormalizer {
    fn normalize(&self, raw: &str, page_number: u32) -> Option<NormalizedPage> {
        if raw.trim().is_empty() {
            return None;
        }

        let lowered = raw
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace(['\u{2019}', '\u{2018}'], "'")
            .to_lowercase();
        let is_terminal = self.marker.is_terminal(&lowered);

        let cleaned = strip_footers(&strip_timestamps(&lowered));
        let lines: Vec<NormalizedLine> = split_numbered_lines(&cleaned)
            .into_iter()
            .map(|(number, content)| NormalizedLine {
                number,
                text: reduce_tokens(&content),
            })
            .collect();

        if lines.is_empty() {
            return None;
        }
        Some(NormalizedPage::new(page_number, lines, is_terminal))
    }
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

static RE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}:\d{2}(?::\d{2})?\b").unwrap());

static RE_FOOTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bpage\s+\d+(?:\s+of\s+\d+)?\b").unwrap());

fn strip_timestamps(input: &str) -> String {
    RE_TIMESTAMP.replace_all(input, " ").into_owned()
}

fn strip_footers(input: &str) -> String {
    RE_FOOTER.replace_all(input, " ").into_owned()
}

// ── Line numbering ───────────────────────────────────────────────────────────

static RE_LINE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})(?:\s+(.*))?$").unwrap());

/// Split page text into `(line_number, content)` pairs.
///
/// A line counts as numbered when it starts with 1–25 and continues the
/// ascending sequence. Unnumbered text before line 1 (captions, headers) is
/// dropped; unnumbered text after it belongs to the preceding line. Pages
/// without any numbering fall back to counting non-blank lines.
fn split_numbered_lines(text: &str) -> Vec<(u32, String)> {
    let mut out: Vec<(u32, String)> = Vec::new();
    let mut last = 0u32;

    for raw_line in text.lines() {
        let numbered = RE_LINE_NUMBER.captures(raw_line).and_then(|caps| {
            let n: u32 = caps[1].parse().ok()?;
            let rest = caps.get(2).map_or("", |m| m.as_str());
            (n >= 1 && n <= LINES_PER_PAGE && n > last).then(|| (n, rest.trim().to_string()))
        });

        match numbered {
            Some((n, rest)) => {
                last = n;
                out.push((n, rest));
            }
            None => {
                let trimmed = raw_line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some((_, content)) = out.last_mut() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }
    }

    if out.is_empty() {
        return sequential_lines(text);
    }
    out
}

fn sequential_lines(text: &str) -> Vec<(u32, String)> {
    let mut out: Vec<(u32, String)> = Vec::new();
    for trimmed in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if out.len() < LINES_PER_PAGE as usize {
            out.push((out.len() as u32 + 1, trimmed.to_string()));
        } else if let Some((_, content)) = out.last_mut() {
            content.push(' ');
            content.push_str(trimmed);
        }
    }
    out
}

// ── Token reduction ──────────────────────────────────────────────────────────

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-z0-9]+(?:'[a-z]+)?(?:[-./@][a-z0-9]+)*|[^\s\w]").unwrap()
});

/// Tag, lemmatise and filter the tokens of one line.
fn reduce_tokens(content: &str) -> String {
    RE_TOKEN
        .find_iter(content)
        .map(|m| m.as_str())
        .filter(|tok| !matches!(*tok, "," | ";"))
        .filter_map(|tok| {
            let role = lexicon::tag(tok);
            if role.is_closed_class() || lexicon::is_stop_word(tok) {
                return None;
            }
            let lemma = lexicon::lemmatize(tok, role);
            if lexicon::is_stop_word(&lemma) {
                return None;
            }
            Some(lemma)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Document preparation ─────────────────────────────────────────────────────

static RE_PAGE_LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*page\s+(\d{1,5})(?:\s+of\s+\d+)?\s*$").unwrap());

static RE_PAGE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpage\s+(\d{1,5})\b").unwrap());

/// Page number printed on the page, e.g. a "Page 12" footer.
///
/// A label standing on its own line wins over one embedded in text.
pub fn printed_page_label(raw: &str) -> Option<u32> {
    RE_PAGE_LABEL_LINE
        .captures(raw)
        .or_else(|| RE_PAGE_LABEL.captures(raw))
        .and_then(|caps| caps[1].parse().ok())
        .filter(|&n| n > 0)
}

/// Pages that survived selection, extraction and terminal detection.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub pages: Vec<Arc<NormalizedPage>>,
    pub source_pages: usize,
    pub skipped_pages: Vec<u32>,
    pub terminal_page: Option<u32>,
    pub pages_after_terminal: usize,
}

/// Normalise the selected pages of a document.
///
/// Page consumption stops after the first terminal page; that page is kept.
/// Under [`PageNumbering::Printed`], a page repeating an earlier number is
/// skipped.
pub fn normalize_document(
    raw_pages: &[Option<String>],
    config: &TocConfig,
) -> Result<PreparedDocument, TocError> {
    let total = raw_pages.len();
    let indices = config.pages.to_indices(total);
    if indices.is_empty() {
        let requested = match &config.pages {
            PageSelection::All => None,
            PageSelection::Single(p) => Some(*p),
            PageSelection::Range(s, _) => Some(*s),
            PageSelection::Set(v) => v.iter().copied().min(),
        };
        if let Some(page) = requested {
            return Err(TocError::PageOutOfRange { page, total });
        }
    }

    let normalizer: Arc<dyn Normalizer> = config
        .normalizer
        .clone()
        .unwrap_or_else(|| Arc::new(RuleNormalizer::new(config.terminal_marker.clone())));

    let mut pages = Vec::with_capacity(indices.len());
    let mut skipped_pages = Vec::new();
    let mut terminal_page = None;
    let mut pages_after_terminal = 0usize;
    let mut seen = HashSet::new();

    for idx in indices {
        if terminal_page.is_some() {
            pages_after_terminal += 1;
            continue;
        }

        let raw = raw_pages[idx].as_deref();
        let page_number = match config.page_numbering {
            PageNumbering::Sequential => idx as u32 + 1,
            PageNumbering::Printed => raw
                .and_then(printed_page_label)
                .unwrap_or(idx as u32 + 1),
        };

        if !seen.insert(page_number) {
            warn!(
                "Source page {} repeats page number {}, skipping",
                idx + 1,
                page_number
            );
            continue;
        }

        let Some(page) = raw.and_then(|r| normalizer.normalize(r, page_number)) else {
            warn!("Page {}: no extractable text, skipping", page_number);
            skipped_pages.push(page_number);
            continue;
        };

        if page.is_terminal {
            debug!("Page {}: end-of-transcript marker found", page_number);
            terminal_page = Some(page_number);
        }
        pages.push(Arc::new(page));
    }

    info!(
        "Normalised {} of {} pages ({} skipped, {} after terminal page)",
        pages.len(),
        total,
        skipped_pages.len(),
        pages_after_terminal
    );

    Ok(PreparedDocument {
        pages,
        source_pages: total,
        skipped_pages,
        terminal_page,
        pages_after_terminal,
    })
}
