//! Anchor validation: turn a candidate into a [`TocEntry`] or reject it.
//!
//! A candidate is kept only when its page belongs to the window it came
//! from and its line exists on that page. Rejections are values, not errors;
//! the caller logs them and moves on.

use crate::error::AnchorRejection;
use crate::output::TocEntry;
use crate::pipeline::classify::{LineRef, TopicCandidate};
use crate::pipeline::normalize::{NormalizedPage, LINES_PER_PAGE};
use crate::pipeline::window::Window;
use once_cell::sync::Lazy;
use regex::Regex;

/// Resolve a candidate against the window it was produced for.
pub fn resolve(candidate: &TopicCandidate, window: &Window) -> Result<TocEntry, AnchorRejection> {
    let label = candidate.label.trim();
    if label.is_empty() {
        return Err(AnchorRejection::EmptyLabel {
            page: candidate.page_start,
        });
    }

    let page = u32::try_from(candidate.page_start)
        .ok()
        .and_then(|n| window.page(n))
        .ok_or_else(|| AnchorRejection::PageNotInWindow {
            label: label.to_string(),
            page: candidate.page_start,
            window: window.index,
        })?;

    let line = match &candidate.line {
        LineRef::Number(n) => resolve_number(label, *n, page)?,
        LineRef::Text(text) => resolve_text(label, text, page)?,
    };

    Ok(TocEntry::new(label, page.page_number, line))
}

fn resolve_number(label: &str, line: i64, page: &NormalizedPage) -> Result<u32, AnchorRejection> {
    let in_range = u32::try_from(line)
        .ok()
        .filter(|n| (1..=LINES_PER_PAGE).contains(n));
    let Some(n) = in_range else {
        return Err(AnchorRejection::LineOutOfRange {
            label: label.to_string(),
            line,
        });
    };
    if page.line(n).is_none() {
        return Err(AnchorRejection::LineNotOnPage {
            label: label.to_string(),
            page: page.page_number,
            line: n,
        });
    }
    Ok(n)
}

static RE_LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})\b\s*(.*)$").unwrap());

/// Find the first line whose text starts with the reported literal.
///
/// The literal may or may not carry the line number itself; both the
/// rendered `"<n> <text>"` form and the bare content are tried,
/// case-insensitively. No matching line rejects the anchor.
fn resolve_text(label: &str, literal: &str, page: &NormalizedPage) -> Result<u32, AnchorRejection> {
    let wanted = collapse_ws(&literal.to_lowercase());
    let not_found = || AnchorRejection::LineTextNotFound {
        label: label.to_string(),
        page: page.page_number,
        text: literal.to_string(),
    };
    if wanted.is_empty() {
        return Err(not_found());
    }

    let content = match RE_LEADING_NUMBER.captures(&wanted) {
        Some(caps) => caps[2].to_string(),
        None => wanted.clone(),
    };

    for line in &page.lines {
        let text = collapse_ws(&line.text.to_lowercase());
        let rendered = format!("{} {}", line.number, text);
        if rendered.starts_with(&wanted) || (!content.is_empty() && text.starts_with(&content)) {
            return Ok(line.number);
        }
    }

    Err(not_found())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
