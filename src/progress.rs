//! Progress-callback trait for per-unit extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each unit.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a progress bar, or a log sink without
//! the library knowing how the host application communicates. The trait is
//! `Send + Sync` because units are extracted concurrently.

use std::sync::Arc;

/// Called by the pipeline as it processes each unit.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_unit_*` methods may be called concurrently
/// from different tasks; implementations must synchronise shared state.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after splitting, before any unit is extracted.
    fn on_run_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before a unit's extraction begins.
    fn on_unit_start(&self, unit_index: usize, total_units: usize) {
        let _ = (unit_index, total_units);
    }

    /// Called when a unit extracts successfully.
    fn on_unit_complete(&self, unit_index: usize, total_units: usize) {
        let _ = (unit_index, total_units);
    }

    /// Called when a unit fails (backend error, timeout, cancellation).
    fn on_unit_error(&self, unit_index: usize, total_units: usize, error: &str) {
        let _ = (unit_index, total_units, error);
    }

    /// Called once after every unit has been attempted.
    fn on_run_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_unit_start(&self, _unit_index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unit_complete(&self, _unit_index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unit_error(&self, _unit_index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_unit_start(0, 3);
        cb.on_unit_complete(0, 3);
        cb.on_unit_error(1, 3, "timeout");
        cb.on_run_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };

        tracker.on_unit_start(0, 2);
        tracker.on_unit_complete(0, 2);
        tracker.on_unit_start(1, 2);
        tracker.on_unit_error(1, 2, "backend unavailable");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ExtractionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_unit_complete(1, 10);
    }
}
