//! Overlapping windows of consecutive pages.

use crate::output::WindowSpan;
use crate::pipeline::normalize::NormalizedPage;
use std::sync::Arc;

/// A run of `window_size` consecutive normalised pages.
#[derive(Debug, Clone)]
pub struct Window {
    pub index: usize,
    pub pages: Vec<Arc<NormalizedPage>>,
}

impl Window {
    /// Member page texts joined in page order, each with its page marker.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.page_number).collect()
    }

    pub fn page(&self, page_number: u32) -> Option<&NormalizedPage> {
        self.pages
            .iter()
            .find(|p| p.page_number == page_number)
            .map(|p| p.as_ref())
    }

    pub fn span(&self) -> WindowSpan {
        WindowSpan {
            index: self.index,
            first_page: self.pages.first().map_or(0, |p| p.page_number),
            last_page: self.pages.last().map_or(0, |p| p.page_number),
        }
    }
}

/// Offsets of every full window: `0, stride, 2*stride, …`.
fn window_starts(len: usize, window_size: usize, stride: usize) -> impl Iterator<Item = usize> {
    (0..)
        .map(move |i| i * stride)
        .take_while(move |start| start + window_size <= len)
}

/// Cut pages into overlapping windows.
///
/// Only full windows are produced; trailing pages that do not fill one are
/// left out (see [`uncovered_pages`]). Callers guarantee
/// `0 < stride < window_size`.
pub fn build_windows(
    pages: &[Arc<NormalizedPage>],
    window_size: usize,
    stride: usize,
) -> Vec<Window> {
    if window_size == 0 || stride == 0 {
        return Vec::new();
    }
    window_starts(pages.len(), window_size, stride)
        .enumerate()
        .map(|(index, start)| Window {
            index,
            pages: pages[start..start + window_size].to_vec(),
        })
        .collect()
}

/// Page numbers no full window covers.
pub fn uncovered_pages(
    pages: &[Arc<NormalizedPage>],
    window_size: usize,
    stride: usize,
) -> Vec<u32> {
    if window_size == 0 || stride == 0 {
        return pages.iter().map(|p| p.page_number).collect();
    }
    let covered_to = window_starts(pages.len(), window_size, stride)
        .last()
        .map_or(0, |start| start + window_size);
    pages[covered_to..].iter().map(|p| p.page_number).collect()
}
