//! Batch orchestration: every slide analysed in order, failures contained.
//!
//! [`run`] is the core loop. It owns a fresh [`PresentationContext`] for the
//! duration of one presentation, analyses slides strictly one after another
//! (slide N's prompt reads what slides 1..N-1 added to the context) and
//! turns each [`AnalysisFailure`](crate::error::AnalysisFailure) into a
//! placeholder so the caller always receives one result per slide.
//!
//! The `analyze_*` functions wrap `run` with source resolution, provider
//! resolution and rasterisation. Use [`crate::stream::analyze_stream`]
//! instead when results should be consumed as each slide finishes.

use crate::config::AnalysisConfig;
use crate::context::{ContextSnapshot, PresentationContext};
use crate::error::SlidesError;
use crate::output::{AnalysisOutput, AnalysisStats, SlideAnalysisResult, SlideImage};
use crate::pipeline::analyzer::{AnalyzerSettings, SlideAnalyzer};
use crate::pipeline::input;
use crate::pipeline::oracle::{LlmOracle, Oracle};
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::progress::ProgressCallback;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Analyse `images` in slide order against a fresh context.
///
/// Always returns exactly one result per image, `results[i].slide_number ==
/// i + 1`, together with the flattened context accumulated over the run.
pub async fn run(
    images: &[SlideImage],
    audience_description: &str,
    analyzer: &SlideAnalyzer,
    progress: Option<&ProgressCallback>,
) -> (Vec<SlideAnalysisResult>, ContextSnapshot) {
    let total = images.len();
    let mut context = PresentationContext::new(audience_description, total);
    info!(
        "Analysing {} slides for audience: {}",
        total,
        context.effective_audience()
    );

    if let Some(cb) = progress {
        cb.on_run_start(total);
    }

    let mut results = Vec::with_capacity(total);
    for (i, image) in images.iter().enumerate() {
        let result = analyze_slide(analyzer, image, i + 1, total, &mut context, progress).await;
        results.push(result);
    }

    if let Err(e) = check_integrity(total, results.len()) {
        error!("{}", e);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    if let Some(cb) = progress {
        cb.on_run_complete(total, succeeded);
    }
    info!("Run complete: {}/{} slides analysed", succeeded, total);

    (results, context.snapshot())
}

/// Analyse one slide, substituting a placeholder on failure.
pub(crate) async fn analyze_slide(
    analyzer: &SlideAnalyzer,
    image: &SlideImage,
    slide_number: usize,
    total: usize,
    context: &mut PresentationContext,
    progress: Option<&ProgressCallback>,
) -> SlideAnalysisResult {
    if let Some(cb) = progress {
        cb.on_slide_start(slide_number, total);
    }

    let result = match analyzer.analyze(image, slide_number, context).await {
        Ok(analysis) => {
            if let Some(cb) = progress {
                cb.on_slide_complete(slide_number, total, analysis.text.len());
            }
            SlideAnalysisResult {
                input_tokens: analysis.input_tokens,
                output_tokens: analysis.output_tokens,
                duration_ms: analysis.duration_ms,
                ..SlideAnalysisResult::succeeded(slide_number, analysis.text)
            }
        }
        Err(failure) => {
            warn!("{}; using placeholder", failure);
            if let Some(cb) = progress {
                cb.on_slide_error(slide_number, total, &failure.to_string());
            }
            SlideAnalysisResult::placeholder(failure)
        }
    };

    result.with_image_path(image.path.display().to_string())
}

pub(crate) fn check_integrity(expected: usize, actual: usize) -> Result<(), SlidesError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SlidesError::IntegrityMismatch { expected, actual })
    }
}

// ── End-to-end entry points ──────────────────────────────────────────────

/// Analyse a PDF file or URL for the given audience.
///
/// Slides are rendered into `config.output_dir` (stale `*.png` removed
/// first). Returns `Err` only for run-level failures: the source could not
/// be resolved, no provider is configured, or rasterisation failed.
/// Per-slide failures show up as placeholder results.
pub async fn analyze_document(
    input_str: impl AsRef<str>,
    audience_description: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SlidesError> {
    let oracle = build_oracle(config)?;
    let rasterizer = pdfium_rasterizer(config);
    analyze_with(input_str, audience_description, config, &rasterizer, oracle).await
}

/// [`analyze_document`] with caller-supplied capabilities.
pub async fn analyze_with(
    input_str: impl AsRef<str>,
    audience_description: &str,
    config: &AnalysisConfig,
    rasterizer: &dyn Rasterizer,
    oracle: Arc<dyn Oracle>,
) -> Result<AnalysisOutput, SlidesError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    // ── Step 1: Resolve source ───────────────────────────────────────────
    let resolved = input::resolve_source(
        input_str,
        config.max_source_bytes,
        config.download_timeout_secs,
    )
    .await?;

    // ── Step 2: Rasterise ────────────────────────────────────────────────
    let render_start = Instant::now();
    let images = rasterizer.render(resolved.path(), &config.output_dir).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} slides in {}ms", images.len(), render_duration_ms);

    // ── Step 3: Analyse ──────────────────────────────────────────────────
    let analyzer = SlideAnalyzer::new(oracle, AnalyzerSettings::from(config));
    let analysis_start = Instant::now();
    let (results, context) = run(
        &images,
        audience_description,
        &analyzer,
        config.progress_callback.as_ref(),
    )
    .await;

    // ── Step 4: Stats ────────────────────────────────────────────────────
    let stats = AnalysisStats {
        render_duration_ms,
        analysis_duration_ms: analysis_start.elapsed().as_millis() as u64,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        ..AnalysisStats::from_results(&results)
    };

    Ok(AnalysisOutput {
        results,
        context,
        stats,
    })
}

/// Analyse an in-memory PDF.
///
/// The bytes are written to a managed temporary file that is removed when
/// this call returns.
pub async fn analyze_from_bytes(
    bytes: &[u8],
    audience_description: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SlidesError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| SlidesError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| SlidesError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    analyze_document(&path, audience_description, config).await
}

/// Synchronous wrapper around [`analyze_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    audience_description: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SlidesError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SlidesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_document(input_str, audience_description, config))
}

/// Analyse a presentation and write the JSON output to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn analyze_to_file(
    input_str: impl AsRef<str>,
    audience_description: &str,
    output_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisStats, SlidesError> {
    let output = analyze_document(input_str, audience_description, config).await?;
    write_json_atomic(output_path.as_ref(), &output).await?;
    Ok(output.stats)
}

pub(crate) async fn write_json_atomic(
    path: &Path,
    output: &AnalysisOutput,
) -> Result<(), SlidesError> {
    let write_err = |source| SlidesError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(output)
        .map_err(|e| SlidesError::Internal(format!("serialise output: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

/// The pdfium rasteriser configured from `config`.
pub fn pdfium_rasterizer(config: &AnalysisConfig) -> PdfiumRasterizer {
    PdfiumRasterizer::new(config.max_rendered_pixels)
        .with_password(config.password.clone())
        .with_lib_path(config.pdfium_lib_path.clone())
}

/// Wrap the resolved provider as an [`Oracle`].
pub fn build_oracle(config: &AnalysisConfig) -> Result<Arc<dyn Oracle>, SlidesError> {
    let oracle = LlmOracle::new(resolve_provider(config)?);
    info!("Using LLM {}/{}", oracle.provider_name(), oracle.model());
    Ok(Arc::new(oracle))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model_id()`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
///    when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, SlidesError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model_id());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", config.model_id());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SlidesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, SlidesError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SlidesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, OracleError};
    use crate::pipeline::oracle::{RequestKind, Scripted, ScriptedOracle};
    use crate::pipeline::render::persist_slides;
    use crate::progress::AnalysisProgressCallback;
    use crate::prompts::FAILURE_MESSAGE;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Mutex;
    use std::time::Duration;

    fn deck(dir: &Path, n: usize) -> Vec<SlideImage> {
        let pages = (0..n)
            .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 9, Rgba([1, 2, 3, 255]))))
            .collect();
        persist_slides(pages, dir, 2000).unwrap()
    }

    fn analyzer(oracle: Arc<dyn Oracle>) -> SlideAnalyzer {
        SlideAnalyzer::new(
            oracle,
            AnalyzerSettings {
                retry_backoff: Duration::from_millis(1),
                max_retries: 1,
                ..AnalyzerSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn junior_engineers_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let images = deck(dir.path(), 3);
        let oracle = Arc::new(ScriptedOracle::new(|req| match (req.kind, req.slide_number) {
            (RequestKind::SlideAnalysis, 2) => {
                Scripted::Fail(OracleError::ProviderUnavailable("connection reset".into()))
            }
            (RequestKind::SlideAnalysis, _) => Scripted::Reply("fixed analysis".into()),
            (RequestKind::ContextExtraction, _) => Scripted::Reply("Themes: basics".into()),
        }));

        let (results, context) = run(&images, "junior engineers", &analyzer(oracle), None).await;

        assert_eq!(results.len(), 3);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.slide_number, i + 1);
        }
        assert!(results[0].success);
        assert_eq!(results[0].analysis, "fixed analysis\n");
        assert!(!results[1].success);
        assert!(results[1].analysis.contains(FAILURE_MESSAGE));
        assert!(matches!(
            results[1].error.as_ref().map(|e| &e.kind),
            Some(FailureKind::Provider(OracleError::ProviderUnavailable(_)))
        ));
        assert!(results[2].success);
        assert_eq!(results[2].analysis, "fixed analysis\n");
        assert_eq!(context.total_slides, 3);
        assert_eq!(context.audience_description, "junior engineers");
    }

    #[tokio::test]
    async fn later_prompts_see_earlier_context() {
        let dir = tempfile::tempdir().unwrap();
        let images = deck(dir.path(), 2);
        let oracle = Arc::new(ScriptedOracle::new(|req| match (req.kind, req.slide_number) {
            (RequestKind::ContextExtraction, 1) => {
                Scripted::Reply("Themes: observability\nConcepts: tracing spans".into())
            }
            (RequestKind::ContextExtraction, _) => Scripted::Reply("Themes: none".into()),
            (RequestKind::SlideAnalysis, _) => Scripted::Reply("ok".into()),
        }));

        let (_, context) = run(&images, "sre team", &analyzer(oracle.clone()), None).await;

        let slide_prompts: Vec<_> = oracle
            .calls()
            .into_iter()
            .filter(|c| c.kind == RequestKind::SlideAnalysis)
            .collect();
        assert!(!slide_prompts[0].prompt.contains("observability"));
        assert!(slide_prompts[1].prompt.contains("observability"));
        assert!(slide_prompts[1].prompt.contains("tracing spans"));
        assert_eq!(context.themes, vec!["observability".to_string()]);
    }

    #[tokio::test]
    async fn every_slide_fails_still_full_length() {
        let dir = tempfile::tempdir().unwrap();
        let images = deck(dir.path(), 4);
        let oracle = Arc::new(ScriptedOracle::new(|_| Scripted::NoChoices));

        let (results, context) = run(&images, "", &analyzer(oracle), None).await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.image_path.is_some()));
        assert!(!context.has_signals());
    }

    #[tokio::test]
    async fn empty_deck_yields_empty_results() {
        let oracle = Arc::new(ScriptedOracle::always("unused"));
        let (results, context) = run(&[], "anyone", &analyzer(oracle.clone()), None).await;
        assert!(results.is_empty());
        assert_eq!(context.total_slides, 0);
        assert!(oracle.calls().is_empty());
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl AnalysisProgressCallback for Events {
        fn on_run_start(&self, total: usize) {
            self.0.lock().unwrap().push(format!("start {total}"));
        }
        fn on_slide_complete(&self, slide: usize, _total: usize, _len: usize) {
            self.0.lock().unwrap().push(format!("ok {slide}"));
        }
        fn on_slide_error(&self, slide: usize, _total: usize, _error: &str) {
            self.0.lock().unwrap().push(format!("err {slide}"));
        }
        fn on_run_complete(&self, total: usize, ok: usize) {
            self.0.lock().unwrap().push(format!("done {ok}/{total}"));
        }
    }

    #[tokio::test]
    async fn progress_events_follow_slide_order() {
        let dir = tempfile::tempdir().unwrap();
        let images = deck(dir.path(), 2);
        let oracle = Arc::new(ScriptedOracle::new(|req| match req.slide_number {
            1 => Scripted::Fail(OracleError::InvalidRequest("bad".into())),
            _ => Scripted::Reply("fine".into()),
        }));
        let events = Arc::new(Events::default());
        let cb: ProgressCallback = events.clone();

        run(&images, "", &analyzer(oracle), Some(&cb)).await;

        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 2", "err 1", "ok 2", "done 1/2"]
        );
    }

    #[test]
    fn json_output_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/analysis.json");
        let output = AnalysisOutput {
            results: vec![SlideAnalysisResult::succeeded(1, "### Summary\nHi\n".into())],
            context: PresentationContext::new("designers", 1).snapshot(),
            stats: AnalysisStats::default(),
        };

        tokio_test::block_on(write_json_atomic(&path, &output)).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let parsed: AnalysisOutput =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.results, output.results);
        assert_eq!(parsed.context.audience_description, "designers");
    }

    #[test]
    fn integrity_mismatch_is_reported() {
        assert!(check_integrity(3, 3).is_ok());
        assert!(matches!(
            check_integrity(3, 2),
            Err(SlidesError::IntegrityMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn unknown_provider_name_is_not_configured() {
        let config = AnalysisConfig::builder().provider_name("no-such-provider").build().unwrap();
        assert!(matches!(
            resolve_provider(&config),
            Err(SlidesError::ProviderNotConfigured { .. })
        ));
    }
}
