//! Progress-callback trait for per-unit batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the driver walks the worklist. The CLI forwards them to an
//! `indicatif` bar; a service could forward them to a channel instead.
//!
//! Units are processed strictly in order, so events arrive in order too. The
//! trait is still `Send + Sync` because the driver runs inside a Tokio task.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2csv::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_unit_complete(&self, done: usize, total: usize, _label: &str, _location: &str) {
//!         self.0.store(done, Ordering::SeqCst);
//!         eprintln!("{done}/{total}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it processes each unit.
///
/// `done` counts units finished so far (written, skipped or failed) and
/// never exceeds `total`. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the worklist has been planned.
    ///
    /// `total_units` counts every page of every PDF plus one per image.
    fn on_batch_start(&self, total_files: usize, total_units: usize) {
        let _ = (total_files, total_units);
    }

    /// Called when a source file is opened.
    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        let _ = (index, total_files, name);
    }

    /// Called just before the model request for a unit.
    fn on_unit_start(&self, done: usize, total: usize, label: &str) {
        let _ = (done, total, label);
    }

    /// Called when a unit's CSV has been written.
    fn on_unit_complete(&self, done: usize, total: usize, label: &str, location: &str) {
        let _ = (done, total, label, location);
    }

    /// Called when a unit is skipped because its output already exists.
    fn on_unit_skipped(&self, done: usize, total: usize, label: &str) {
        let _ = (done, total, label);
    }

    /// Called when a unit, or a whole source, fails.
    fn on_unit_error(&self, done: usize, total: usize, label: &str, error: &str) {
        let _ = (done, total, label, error);
    }

    /// Called before sleeping on a rate-limit signal.
    fn on_rate_limited(&self, label: &str, attempt: u32, wait_secs: u64) {
        let _ = (label, attempt, wait_secs);
    }

    /// Called once at the end, also after cancellation.
    fn on_batch_complete(&self, processed: usize, skipped: usize, failed: usize) {
        let _ = (processed, skipped, failed);
    }
}

/// Default callback when none is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        total: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for Tracking {
        fn on_batch_start(&self, _files: usize, total_units: usize) {
            self.total.store(total_units, Ordering::SeqCst);
        }

        fn on_unit_complete(&self, _d: usize, _t: usize, _l: &str, _loc: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_skipped(&self, _d: usize, _t: usize, _l: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_error(&self, _d: usize, _t: usize, _l: &str, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2, 5);
        cb.on_file_start(0, 2, "a.pdf");
        cb.on_unit_start(0, 5, "a.pdf p1");
        cb.on_unit_complete(1, 5, "a.pdf p1", "out/a_page1.csv");
        cb.on_unit_skipped(2, 5, "a.pdf p2");
        cb.on_unit_error(3, 5, "b.jpg", "no data extracted");
        cb.on_rate_limited("a.pdf p3", 1, 90);
        cb.on_batch_complete(1, 1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_batch_start(1, 3);
        t.on_unit_complete(1, 3, "a.pdf p1", "a_page1.csv");
        t.on_unit_skipped(2, 3, "a.pdf p2");
        t.on_unit_error(3, 3, "a.pdf p3", "boom");
        assert_eq!(t.total.load(Ordering::SeqCst), 3);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.skips.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1, 1);
    }
}
