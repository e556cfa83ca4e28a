//! Streaming analysis API: emit slide results as they complete.
//!
//! A 40-slide deck takes minutes. [`analyze_stream`] renders up front, then
//! yields each [`SlideAnalysisResult`] as soon as its slide is done so callers
//! can show partial output or persist incrementally.
//!
//! Slides are still analysed strictly in order, one at a time, against one
//! private [`PresentationContext`], so results arrive in slide order. The
//! accumulated context can be read from [`SlideStream::context`] at any
//! point; after the stream is exhausted it is the final snapshot.

use crate::config::AnalysisConfig;
use crate::context::{ContextSnapshot, PresentationContext};
use crate::error::SlidesError;
use crate::orchestrator::{analyze_slide, build_oracle, pdfium_rasterizer};
use crate::output::{SlideAnalysisResult, SlideImage};
use crate::pipeline::analyzer::{AnalyzerSettings, SlideAnalyzer};
use crate::pipeline::input;
use crate::pipeline::oracle::Oracle;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use futures::stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_stream::Stream;
use tracing::info;

type BoxedResults = Pin<Box<dyn Stream<Item = SlideAnalysisResult> + Send>>;

/// A stream of per-slide results plus a handle on the run's context.
pub struct SlideStream {
    inner: BoxedResults,
    snapshot: Arc<Mutex<ContextSnapshot>>,
    total_slides: usize,
}

impl SlideStream {
    /// Number of slides this stream will yield.
    pub fn total_slides(&self) -> usize {
        self.total_slides
    }

    /// Context accumulated so far.
    pub fn context(&self) -> ContextSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Stream for SlideStream {
    type Item = SlideAnalysisResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Analyse a PDF file or URL, streaming results slide by slide.
///
/// # Returns
/// - `Ok(SlideStream)`: one item per rendered slide, in slide order
/// - `Err(SlidesError)`: run-level failure (source, provider, rendering)
pub async fn analyze_stream(
    input_str: impl AsRef<str>,
    audience_description: &str,
    config: &AnalysisConfig,
) -> Result<SlideStream, SlidesError> {
    let oracle = build_oracle(config)?;
    let rasterizer = pdfium_rasterizer(config);
    analyze_stream_with(input_str, audience_description, config, &rasterizer, oracle).await
}

/// [`analyze_stream`] with caller-supplied capabilities.
pub async fn analyze_stream_with(
    input_str: impl AsRef<str>,
    audience_description: &str,
    config: &AnalysisConfig,
    rasterizer: &dyn Rasterizer,
    oracle: Arc<dyn Oracle>,
) -> Result<SlideStream, SlidesError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming analysis: {}", input_str);

    // ── Resolve and render ───────────────────────────────────────────────
    let resolved = input::resolve_source(
        input_str,
        config.max_source_bytes,
        config.download_timeout_secs,
    )
    .await?;
    let images = rasterizer.render(resolved.path(), &config.output_dir).await?;

    // ── Build the stream ─────────────────────────────────────────────────
    let analyzer = SlideAnalyzer::new(oracle, AnalyzerSettings::from(config));
    Ok(stream_slides(
        images,
        audience_description,
        analyzer,
        config.progress_callback.clone(),
    ))
}

/// Stream results for already-rendered slides.
pub fn stream_slides(
    images: Vec<SlideImage>,
    audience_description: &str,
    analyzer: SlideAnalyzer,
    progress: Option<ProgressCallback>,
) -> SlideStream {
    let total = images.len();
    let context = PresentationContext::new(audience_description, total);
    let snapshot = Arc::new(Mutex::new(context.snapshot()));
    let publish = Arc::clone(&snapshot);

    if let Some(ref cb) = progress {
        cb.on_run_start(total);
    }

    struct State {
        images: std::vec::IntoIter<SlideImage>,
        next: usize,
        succeeded: usize,
        context: PresentationContext,
        analyzer: SlideAnalyzer,
        progress: Option<ProgressCallback>,
        publish: Arc<Mutex<ContextSnapshot>>,
    }

    let state = State {
        images: images.into_iter(),
        next: 1,
        succeeded: 0,
        context,
        analyzer,
        progress,
        publish,
    };

    let s = stream::unfold(state, move |mut st| async move {
        let Some(image) = st.images.next() else {
            if let Some(ref cb) = st.progress {
                cb.on_run_complete(total, st.succeeded);
            }
            return None;
        };

        let slide_number = st.next;
        let result = analyze_slide(
            &st.analyzer,
            &image,
            slide_number,
            total,
            &mut st.context,
            st.progress.as_ref(),
        )
        .await;

        st.next += 1;
        if result.success {
            st.succeeded += 1;
        }
        if let Ok(mut shared) = st.publish.lock() {
            *shared = st.context.snapshot();
        }
        Some((result, st))
    });

    SlideStream {
        inner: Box::pin(s),
        snapshot,
        total_slides: total,
    }
}
