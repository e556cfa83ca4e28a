//! Integration tests for the analysis pipeline.
//!
//! Rendering is replaced by a rasteriser that writes real PNGs into a temp
//! directory and the VLM by a scripted oracle, so these run offline and
//! without pdfium.

use async_trait::async_trait;
use edgequake_slides::pipeline::oracle::{RequestKind, Scripted, ScriptedOracle};
use edgequake_slides::pipeline::render::persist_slides;
use edgequake_slides::{
    analyze_stream_with, analyze_with, AnalysisConfig, FailureKind, OracleError, Rasterizer,
    SlideImage, SlidesError,
};
use futures::StreamExt;
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness (`--nocapture` shows them).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("edgequake_slides=debug"))
        .with_test_writer()
        .try_init();
}

struct FakeRasterizer {
    pages: usize,
    fail_on: Option<usize>,
    calls: AtomicUsize,
}

impl FakeRasterizer {
    fn pages(pages: usize) -> Self {
        Self {
            pages,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn render(&self, _source: &Path, output_dir: &Path) -> Result<Vec<SlideImage>, SlidesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(page) = self.fail_on {
            return Err(SlidesError::RenderFailure {
                page,
                detail: "simulated".into(),
            });
        }
        let pages = (0..self.pages)
            .map(|i| {
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                    64,
                    36,
                    Rgba([i as u8 * 40, 0, 0, 255]),
                ))
            })
            .collect();
        persist_slides(pages, output_dir, 2000)
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn deck(&self) -> String {
        let path = self.dir.path().join("deck.pdf");
        std::fs::write(&path, b"%PDF-1.7\n% test deck\n").expect("write deck");
        path.display().to_string()
    }

    fn slides_dir(&self) -> PathBuf {
        self.dir.path().join("slides")
    }

    fn config(&self) -> AnalysisConfig {
        AnalysisConfig::builder()
            .output_dir(self.slides_dir())
            .retry_backoff_ms(1)
            .build()
            .expect("valid config")
    }
}

fn junior_oracle() -> Arc<ScriptedOracle> {
    Arc::new(ScriptedOracle::new(|req| match (req.kind, req.slide_number) {
        (RequestKind::SlideAnalysis, 2) => {
            Scripted::Fail(OracleError::ProviderUnavailable("502 bad gateway".into()))
        }
        (RequestKind::SlideAnalysis, _) => Scripted::Reply("### Summary\nStable text".into()),
        (RequestKind::ContextExtraction, n) => {
            Scripted::Reply(format!("Themes: theme {n}\nConcepts: concept {n}"))
        }
    }))
}

// ── Batch analysis ───────────────────────────────────────────────────────────

#[tokio::test]
async fn three_slides_with_middle_failure() {
    let ws = Workspace::new();
    let rasterizer = FakeRasterizer::pages(3);

    let output = analyze_with(ws.deck(), "junior engineers", &ws.config(), &rasterizer, junior_oracle())
        .await
        .expect("run-level success");

    assert_eq!(output.results.len(), 3);
    let numbers: Vec<_> = output.results.iter().map(|r| r.slide_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    assert!(output.results[0].success);
    assert_eq!(output.results[0].analysis, "### Summary\nStable text\n");
    assert!(!output.results[1].success);
    assert!(output.results[1].analysis.contains("### Summary"));
    assert!(output.results[1].analysis.contains("### Key Points"));
    assert!(output.results[1].analysis.contains("### Emphasis Keywords"));
    assert!(output.results[2].success);

    assert_eq!(output.context.total_slides, 3);
    assert_eq!(output.context.audience_description, "junior engineers");
    assert_eq!(output.context.themes, vec!["theme 1", "theme 3"]);
    assert_eq!(output.context.concepts, vec!["concept 1", "concept 3"]);

    assert_eq!(output.stats.total_slides, 3);
    assert_eq!(output.stats.succeeded, 2);
    assert_eq!(output.stats.failed, 1);
}

#[tokio::test]
async fn failed_slide_carries_its_error_in_json() {
    let ws = Workspace::new();
    let output = analyze_with(
        ws.deck(),
        "",
        &ws.config(),
        &FakeRasterizer::pages(3),
        junior_oracle(),
    )
    .await
    .unwrap();

    let failure = output.results[1].error.as_ref().expect("error recorded");
    assert_eq!(failure.slide_number, 2);
    assert!(matches!(failure.kind, FailureKind::Provider(_)));

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["results"][1]["success"], false);
    assert_eq!(json["results"][0]["success"], true);
    assert!(json["results"][0].get("error").is_none());
    assert!(json["context"]["themes"].is_array());
}

#[tokio::test]
async fn image_paths_point_at_rendered_files() {
    let ws = Workspace::new();
    let output = analyze_with(
        ws.deck(),
        "ops",
        &ws.config(),
        &FakeRasterizer::pages(2),
        Arc::new(ScriptedOracle::always("ok")),
    )
    .await
    .unwrap();

    for result in &output.results {
        let path = PathBuf::from(result.image_path.as_deref().expect("image path"));
        assert!(path.is_file(), "{} should exist", path.display());
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("slide_{}.png", result.slide_number)
        );
    }
}

#[tokio::test]
async fn rerun_purges_stale_slides() {
    let ws = Workspace::new();
    let oracle = Arc::new(ScriptedOracle::always("ok"));

    analyze_with(ws.deck(), "", &ws.config(), &FakeRasterizer::pages(3), oracle.clone())
        .await
        .unwrap();
    analyze_with(ws.deck(), "", &ws.config(), &FakeRasterizer::pages(1), oracle)
        .await
        .unwrap();

    let mut files: Vec<_> = std::fs::read_dir(ws.slides_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["slide_1.png"]);
}

#[tokio::test]
async fn empty_deck_is_not_an_error() {
    let ws = Workspace::new();
    let oracle = Arc::new(ScriptedOracle::always("unused"));
    let output = analyze_with(ws.deck(), "", &ws.config(), &FakeRasterizer::pages(0), oracle.clone())
        .await
        .unwrap();
    assert!(output.results.is_empty());
    assert_eq!(output.stats.total_slides, 0);
    assert!(oracle.calls().is_empty());
}

#[tokio::test]
async fn context_extraction_can_be_disabled() {
    let ws = Workspace::new();
    let oracle = junior_oracle();
    let config = AnalysisConfig::builder()
        .output_dir(ws.slides_dir())
        .extract_context(false)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let output = analyze_with(ws.deck(), "", &config, &FakeRasterizer::pages(3), oracle.clone())
        .await
        .unwrap();

    assert!(output.context.themes.is_empty());
    assert!(oracle
        .calls()
        .iter()
        .all(|c| c.kind == RequestKind::SlideAnalysis));
}

// ── Run-level failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_source_never_renders() {
    let ws = Workspace::new();
    let rasterizer = FakeRasterizer::pages(2);
    let missing = ws.dir.path().join("missing.pdf");

    let err = analyze_with(
        missing.display().to_string(),
        "",
        &ws.config(),
        &rasterizer,
        Arc::new(ScriptedOracle::always("ok")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SlidesError::SourceNotFound { .. }));
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_source_is_rejected() {
    let ws = Workspace::new();
    let config = AnalysisConfig::builder()
        .output_dir(ws.slides_dir())
        .max_source_bytes(8)
        .build()
        .unwrap();

    let err = analyze_with(
        ws.deck(),
        "",
        &config,
        &FakeRasterizer::pages(1),
        Arc::new(ScriptedOracle::always("ok")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SlidesError::SourceTooLarge { max: 8, .. }));
}

#[tokio::test]
async fn non_pdf_source_is_rejected() {
    let ws = Workspace::new();
    let pptx = ws.dir.path().join("deck.pptx");
    std::fs::write(&pptx, b"PK\x03\x04 not a pdf").unwrap();

    let err = analyze_with(
        pptx.display().to_string(),
        "",
        &ws.config(),
        &FakeRasterizer::pages(1),
        Arc::new(ScriptedOracle::always("ok")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SlidesError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn render_failure_aborts_run() {
    let ws = Workspace::new();
    let rasterizer = FakeRasterizer {
        fail_on: Some(4),
        ..FakeRasterizer::pages(5)
    };
    let oracle = Arc::new(ScriptedOracle::always("ok"));

    let err = analyze_with(ws.deck(), "", &ws.config(), &rasterizer, oracle.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, SlidesError::RenderFailure { page: 4, .. }));
    assert!(oracle.calls().is_empty());
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_matches_batch_semantics() {
    let ws = Workspace::new();
    let mut stream = analyze_stream_with(
        ws.deck(),
        "junior engineers",
        &ws.config(),
        &FakeRasterizer::pages(3),
        junior_oracle(),
    )
    .await
    .unwrap();

    assert_eq!(stream.total_slides(), 3);
    let mut outcomes = Vec::new();
    while let Some(result) = stream.next().await {
        outcomes.push((result.slide_number, result.success));
    }

    assert_eq!(outcomes, vec![(1, true), (2, false), (3, true)]);
    let context = stream.context();
    assert_eq!(context.total_slides, 3);
    assert_eq!(context.themes, vec!["theme 1", "theme 3"]);
}
