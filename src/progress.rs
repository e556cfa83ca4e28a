//! Progress-callback trait for per-slide analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the deck.
//!
//! Slides are processed strictly in order, so events for slide N always
//! arrive before events for slide N+1. The trait is still `Send + Sync`
//! because separate runs may execute on different Tokio worker threads.
//!
//! # Example
//!
//! ```rust
//! use edgequake_slides::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_slide_complete(&self, slide: usize, total: usize, analysis_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Slide {}/{} done ({} bytes)", slide, total, analysis_len);
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each slide.
///
/// All methods have default no-op implementations.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once, after rendering, before the first slide is analysed.
    fn on_run_start(&self, total_slides: usize) {
        let _ = total_slides;
    }

    /// Called just before the oracle is asked about a slide.
    fn on_slide_start(&self, slide_number: usize, total_slides: usize) {
        let _ = (slide_number, total_slides);
    }

    /// Called when a slide is analysed successfully.
    ///
    /// `analysis_len` is the byte length of the analysis text.
    fn on_slide_complete(&self, slide_number: usize, total_slides: usize, analysis_len: usize) {
        let _ = (slide_number, total_slides, analysis_len);
    }

    /// Called when a slide fails and a placeholder is recorded instead.
    fn on_slide_error(&self, slide_number: usize, total_slides: usize, error: &str) {
        let _ = (slide_number, total_slides, error);
    }

    /// Called once after every slide has been attempted.
    fn on_run_complete(&self, total_slides: usize, success_count: usize) {
        let _ = (total_slides, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
