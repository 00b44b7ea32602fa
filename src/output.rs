//! Result types produced by a table-of-contents run.

use crate::config::ConsolidationMode;
use crate::error::{AnchorRejection, UnitError};
use serde::{Deserialize, Serialize};

/// One row of the finished table of contents.
///
/// Serialises as `{"topic": …, "page_start": …, "line_start": …}`, the same
/// shape the oracle uses for candidates in batch mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    #[serde(rename = "topic")]
    pub label: String,
    pub page_start: u32,
    pub line_start: u32,
}

impl TocEntry {
    pub fn new(label: impl Into<String>, page_start: u32, line_start: u32) -> Self {
        Self {
            label: label.into(),
            page_start,
            line_start,
        }
    }

    /// Sort key for table ordering.
    pub fn anchor(&self) -> (u32, u32) {
        (self.page_start, self.line_start)
    }
}

/// What happened to one analysis unit: a window in batch mode, a page in
/// streaming mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    /// 0-based window index (batch) or position in the page sequence (streaming).
    pub unit_index: usize,
    /// Page numbers covered by the unit, in order.
    pub pages: Vec<u32>,
    /// Candidates returned by the oracle before anchor validation.
    pub candidates: usize,
    /// Candidates whose anchors resolved, in oracle order.
    ///
    /// In streaming mode this holds only entries the consolidator committed.
    pub resolved: Vec<TocEntry>,
    /// Candidates dropped by the anchor resolver.
    pub rejections: Vec<AnchorRejection>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<UnitError>,
}

impl UnitReport {
    pub(crate) fn empty(unit_index: usize, pages: Vec<u32>) -> Self {
        Self {
            unit_index,
            pages,
            candidates: 0,
            resolved: Vec::new(),
            rejections: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    pub(crate) fn failed(unit_index: usize, pages: Vec<u32>, error: UnitError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(unit_index, pages)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TocStats {
    pub mode: ConsolidationMode,
    /// Pages in the source document.
    pub source_pages: usize,
    /// Pages normalised and eligible for analysis.
    pub text_pages: usize,
    /// Selected pages that yielded no text.
    pub skipped_pages: Vec<u32>,
    /// Page carrying the end-of-transcript marker, if any.
    pub terminal_page: Option<u32>,
    /// Selected pages ignored because they follow the terminal page.
    pub pages_after_terminal: usize,
    /// Units submitted (windows or pages).
    pub units: usize,
    pub failed_units: usize,
    /// Trailing pages no full window covers (batch mode).
    pub uncovered_pages: Vec<u32>,
    pub candidates: usize,
    pub rejected_anchors: usize,
    pub entries: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub oracle_duration_ms: u64,
    /// The run stopped early on cancellation or an exhausted page budget.
    pub stopped_early: bool,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocOutput {
    pub entries: Vec<TocEntry>,
    pub units: Vec<UnitReport>,
    pub stats: TocStats,
}

impl TocOutput {
    /// `true` when consolidation yielded no topics. Not an error: callers
    /// should report it and skip writing artifacts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Span of pages covered by one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpan {
    pub index: usize,
    pub first_page: u32,
    pub last_page: u32,
}

/// Dry-run view of a transcript: what would be sent to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source_pages: usize,
    pub text_pages: usize,
    pub skipped_pages: Vec<u32>,
    pub terminal_page: Option<u32>,
    pub pages_after_terminal: usize,
    pub windows: Vec<WindowSpan>,
    pub uncovered_pages: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serialises_with_topic_key() {
        let e = TocEntry::new("Appearances", 3, 1);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["topic"], "Appearances");
        assert_eq!(json["page_start"], 3);
        assert_eq!(json["line_start"], 1);
    }

    #[test]
    fn failed_report_carries_error() {
        let r = UnitReport::failed(1, vec![8, 9], UnitError::Cancelled { unit: 1 });
        assert!(!r.is_ok());
        assert!(r.resolved.is_empty());
        assert_eq!(r.pages, vec![8, 9]);
    }
}
