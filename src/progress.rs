//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the book. Pages are processed strictly in
//! order on one task, so events arrive in page order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2epub::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CheckpointCounter {
//!     saved: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CheckpointCounter {
//!     fn on_checkpoint(&self, processed_page: usize, total_pages: usize) {
//!         self.saved.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("saved through page {}/{}", processed_page, total_pages);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CheckpointCounter { saved: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Page numbers are 1-indexed document pages.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the remaining pages are known, before the first page.
    ///
    /// `remaining` counts the pages this invocation will attempt;
    /// `total_pages` is the last page of the selection.
    fn on_conversion_start(&self, remaining: usize, total_pages: usize) {
        let _ = (remaining, total_pages);
    }

    /// Called when a matching checkpoint was loaded.
    fn on_resume(&self, next_page: usize, total_pages: usize) {
        let _ = (next_page, total_pages);
    }

    /// Called before the first oracle request for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after a page was folded into the chapter list.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, fragments: usize) {
        let _ = (page_num, total_pages, fragments);
    }

    /// Called when a page was classified as table of contents and skipped.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after a failed attempt, before the backoff wait.
    fn on_extraction_retry(&self, page_num: usize, attempt: u32, error: &str) {
        let _ = (page_num, attempt, error);
    }

    /// Called after the checkpoint and temporary book were written.
    fn on_checkpoint(&self, processed_page: usize, total_pages: usize) {
        let _ = (processed_page, total_pages);
    }

    /// Called when a page failed terminally, just before the run aborts.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once the final EPUB is in place.
    fn on_conversion_complete(&self, processed: usize, chapters: usize) {
        let _ = (processed, chapters);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        retries: AtomicUsize,
        checkpoints: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_page_complete(&self, _page_num: usize, _total: usize, _fragments: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_retry(&self, _page_num: usize, _attempt: u32, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_checkpoint(&self, _processed: usize, _total: usize) {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(5, 5);
        cb.on_resume(3, 5);
        cb.on_page_start(3, 5);
        cb.on_extraction_retry(3, 1, "503");
        cb.on_page_complete(3, 5, 4);
        cb.on_page_skipped(4, 5);
        cb.on_checkpoint(4, 5);
        cb.on_page_error(5, 5, "boom");
        cb.on_conversion_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_complete(1, 2, 3);
        tracker.on_extraction_retry(2, 1, "timeout");
        tracker.on_page_complete(2, 2, 0);
        tracker.on_checkpoint(2, 2);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.checkpoints.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_page_start(1, 10);
    }
}
