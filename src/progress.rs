//! Progress-callback trait for per-unit run events.
//!
//! Inject an [`Arc<dyn TocProgressCallback>`] via
//! [`crate::config::TocConfigBuilder::progress_callback`] to receive events
//! as the pipeline classifies each window (batch mode) or page (streaming
//! mode).
//!
//! # Example
//!
//! ```rust
//! use depo_toc::{TocConfig, TocProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl TocProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, unit: usize, total_units: usize, candidates: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("unit {}/{}: {} candidates", unit + 1, total_units, candidates);
//!     }
//! }
//!
//! let config = TocConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each unit.
///
/// In batch mode `on_unit_start`, `on_unit_complete` and `on_unit_error`
/// may be called concurrently; implementations must synchronise shared
/// state. All methods default to no-ops.
pub trait TocProgressCallback: Send + Sync {
    /// Called once after windowing, before the first oracle call.
    fn on_run_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before the oracle request for a unit is sent.
    fn on_unit_start(&self, unit: usize, total_units: usize) {
        let _ = (unit, total_units);
    }

    /// Called when a unit's reply has been parsed.
    ///
    /// `candidates` counts topics returned by the oracle before anchor
    /// validation.
    fn on_unit_complete(&self, unit: usize, total_units: usize, candidates: usize) {
        let _ = (unit, total_units, candidates);
    }

    /// Called when a unit fails (malformed reply, exhausted retries, …).
    fn on_unit_error(&self, unit: usize, total_units: usize, error: &str) {
        let _ = (unit, total_units, error);
    }

    /// Called once after consolidation.
    fn on_run_complete(&self, total_units: usize, entries: usize) {
        let _ = (total_units, entries);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TocProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TocConfig`].
pub type ProgressCallback = Arc<dyn TocProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        entries: AtomicUsize,
    }

    impl TocProgressCallback for TrackingCallback {
        fn on_unit_start(&self, _unit: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_complete(&self, _unit: usize, _total: usize, _candidates: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_error(&self, _unit: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, entries: usize) {
            self.entries.store(entries, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_unit_start(0, 2);
        cb.on_unit_complete(0, 2, 3);
        cb.on_unit_error(1, 2, "malformed");
        cb.on_run_complete(2, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_unit_start(0, 2);
        tracker.on_unit_complete(0, 2, 4);
        tracker.on_unit_start(1, 2);
        tracker.on_unit_error(1, 2, "timeout");
        tracker.on_run_complete(2, 4);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.entries.load(Ordering::SeqCst), 4);
    }
}
