//! Consolidation: per-unit entries → one ordered table of contents.
//!
//! Two strategies share the [`Consolidator`] trait:
//!
//! ```text
//!  OverlapConsolidator (batch)          SequentialConsolidator (streaming)
//!  ───────────────────────────          ──────────────────────────────────
//!  offer(): buffer every entry          offer(): append unless the label
//!  finish(): sort by anchor, then         repeats the last topic; commit
//!    (window, seq); walk once and         immediately
//!    drop a label equal to the last     finish(): return the appended list
//!    emitted one or an anchor equal
//!    to the last emitted anchor
//! ```
//!
//! The batch sort key makes the result independent of the order in which
//! windows finished. The overlap page of two windows is classified twice,
//! so a topic starting there arrives twice with the same label and is
//! collapsed by the walk.

use crate::config::ConsolidationMode;
use crate::output::TocEntry;
use tracing::debug;

/// An anchor-validated entry with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub entry: TocEntry,
    pub window_index: usize,
    /// Position within the window's reply.
    pub seq: usize,
}

/// Merges resolved entries into the final table.
pub trait Consolidator: Send {
    /// Offer one entry. Returns the entry when it is committed right away
    /// (streaming); batch consolidation defers every decision to `finish`.
    fn offer(&mut self, resolved: ResolvedEntry) -> Option<TocEntry>;

    /// Label of the most recently committed topic.
    fn last_topic(&self) -> Option<&str>;

    /// Produce the table. Calling it again returns the same table.
    fn finish(&mut self) -> Vec<TocEntry>;
}

/// The consolidator for a mode.
pub fn consolidator_for(mode: ConsolidationMode) -> Box<dyn Consolidator> {
    match mode {
        ConsolidationMode::Batch => Box::new(OverlapConsolidator::default()),
        ConsolidationMode::Streaming => Box::new(SequentialConsolidator::default()),
    }
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct OverlapConsolidator {
    pending: Vec<ResolvedEntry>,
    table: Vec<TocEntry>,
}

impl Consolidator for OverlapConsolidator {
    fn offer(&mut self, resolved: ResolvedEntry) -> Option<TocEntry> {
        self.pending.push(resolved);
        None
    }

    fn last_topic(&self) -> Option<&str> {
        self.table.last().map(|e| e.label.as_str())
    }

    fn finish(&mut self) -> Vec<TocEntry> {
        if self.pending.is_empty() {
            return self.table.clone();
        }
        let mut all = std::mem::take(&mut self.pending);
        all.sort_by_key(|r| (r.entry.anchor(), r.window_index, r.seq));

        // Entries buffered after an earlier finish are merged with it.
        let mut merged: Vec<TocEntry> = Vec::with_capacity(all.len());
        let mut previous = std::mem::take(&mut self.table).into_iter().peekable();
        for r in all {
            while previous.peek().is_some_and(|p| p.anchor() <= r.entry.anchor()) {
                if let Some(p) = previous.next() {
                    push_distinct(&mut merged, p);
                }
            }
            push_distinct(&mut merged, r.entry);
        }
        for p in previous {
            push_distinct(&mut merged, p);
        }

        self.table = merged;
        self.table.clone()
    }
}

fn push_distinct(table: &mut Vec<TocEntry>, entry: TocEntry) {
    if let Some(last) = table.last() {
        if last.label == entry.label {
            debug!(
                "Dropping '{}' at page {} line {}: continues the previous entry",
                entry.label, entry.page_start, entry.line_start
            );
            return;
        }
        if last.anchor() == entry.anchor() {
            debug!(
                "Dropping '{}' at page {} line {}: anchor already taken by '{}'",
                entry.label, entry.page_start, entry.line_start, last.label
            );
            return;
        }
    }
    table.push(entry);
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SequentialConsolidator {
    table: Vec<TocEntry>,
}

impl Consolidator for SequentialConsolidator {
    fn offer(&mut self, resolved: ResolvedEntry) -> Option<TocEntry> {
        if self.last_topic() == Some(resolved.entry.label.as_str()) {
            debug!(
                "Page {}: '{}' repeats the last topic",
                resolved.entry.page_start, resolved.entry.label
            );
            return None;
        }
        self.table.push(resolved.entry.clone());
        Some(resolved.entry)
    }

    fn last_topic(&self) -> Option<&str> {
        self.table.last().map(|e| e.label.as_str())
    }

    fn finish(&mut self) -> Vec<TocEntry> {
        self.table.clone()
    }
}
