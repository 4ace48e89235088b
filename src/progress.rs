//! Progress-callback trait for talk, slide and summary events.
//!
//! Inject an [`Arc<dyn DigestProgressCallback>`] via
//! [`crate::config::DigestConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks each deck. The trait is `Send + Sync` because
//! summary events fire from concurrently running workers.
//!
//! # Example
//!
//! ```rust
//! use slide_digest::{DigestConfig, DigestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SlideCounter(AtomicUsize);
//!
//! impl DigestProgressCallback for SlideCounter {
//!     fn on_slide_captured(&self, _slide: usize, _total: usize, _from_cache: bool) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = DigestConfig::builder()
//!     .progress_callback(Arc::new(SlideCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes talks.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait DigestProgressCallback: Send + Sync {
    /// Called once before the first talk of a batch.
    fn on_batch_start(&self, total_talks: usize) {
        let _ = total_talks;
    }

    /// Called when a talk page starts loading.
    fn on_talk_start(&self, talk_num: usize, url: &str) {
        let _ = (talk_num, url);
    }

    /// Called once the player is found and the slide count is known.
    fn on_deck_discovered(&self, url: &str, total_slides: usize) {
        let _ = (url, total_slides);
    }

    /// Called after each slide is extracted.
    ///
    /// * `from_cache`: text and image came from a previous run
    fn on_slide_captured(&self, slide: usize, total_slides: usize, from_cache: bool) {
        let _ = (slide, total_slides, from_cache);
    }

    /// Called when one summary unit finishes (successfully or not).
    fn on_summary_complete(&self, key: &str, ok: bool) {
        let _ = (key, ok);
    }

    /// Called when a talk finishes with its summary count.
    fn on_talk_complete(&self, talk_num: usize, url: &str, summaries: usize) {
        let _ = (talk_num, url, summaries);
    }

    /// Called when a talk aborts; the batch continues.
    fn on_talk_error(&self, talk_num: usize, url: &str, error: &str) {
        let _ = (talk_num, url, error);
    }

    /// Called once after every talk was attempted.
    fn on_batch_complete(&self, total_talks: usize, succeeded: usize) {
        let _ = (total_talks, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DigestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DigestConfig`].
pub type ProgressCallback = Arc<dyn DigestProgressCallback>;
