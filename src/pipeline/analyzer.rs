//! Slide analysis: one slide image in, one audience-tailored analysis out.
//!
//! ## Steps
//!
//! 1. Read the rendered PNG back and base64-encode it.
//! 2. Build the prompt from the current [`PresentationContext`] so the slide
//!    is framed by whatever earlier slides established.
//! 3. Ask the oracle, bounded by a per-call timeout and retried with
//!    exponential backoff on transient failures.
//! 4. Reject an empty choice list or blank text as
//!    [`FailureKind::EmptyResponse`].
//! 5. Optionally ask a second, smaller question: which themes and concepts in
//!    this analysis matter to the audience. The reply is parsed leniently by
//!    [`parse_context_signals`] and folded into the context. This step is
//!    best-effort and can never fail the slide.
//!
//! The analyzer reports failure and never invents placeholder text; what to
//! do about a failed slide is the orchestrator's decision.

use crate::config::AnalysisConfig;
use crate::context::{ContextSignals, PresentationContext};
use crate::error::{AnalysisFailure, FailureKind};
use crate::output::SlideImage;
use crate::pipeline::encode::encode_slide;
use crate::pipeline::oracle::{Oracle, OracleRequest, OracleResponse, RequestKind};
use crate::pipeline::postprocess::clean_analysis;
use crate::prompts::{build_context_prompt, build_slide_prompt, CONCEPTS_PREFIX, THEMES_PREFIX};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Longest sleep between two attempts, whatever the base and attempt count.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Oracle call parameters, derived from [`AnalysisConfig`].
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub context_max_tokens: usize,
    pub extract_context: bool,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub api_timeout: Duration,
}

impl From<&AnalysisConfig> for AnalyzerSettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_max_tokens: config.context_max_tokens,
            extract_context: config.extract_context,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// A successful slide analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideAnalysis {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    /// Signals folded into the context after this slide (empty if extraction
    /// was disabled or produced nothing).
    pub signals: ContextSignals,
    pub duration_ms: u64,
}

/// Analyzes single slides against an [`Oracle`].
#[derive(Clone)]
pub struct SlideAnalyzer {
    oracle: Arc<dyn Oracle>,
    settings: AnalyzerSettings,
}

impl SlideAnalyzer {
    pub fn new(oracle: Arc<dyn Oracle>, settings: AnalyzerSettings) -> Self {
        Self { oracle, settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Analyze one slide, updating `context` with any extracted signals.
    pub async fn analyze(
        &self,
        image: &SlideImage,
        slide_number: usize,
        context: &mut PresentationContext,
    ) -> Result<SlideAnalysis, AnalysisFailure> {
        let start = Instant::now();
        let fail = |kind| AnalysisFailure::new(slide_number, kind);

        let image_data = encode_slide(image)
            .await
            .map_err(|e| fail(FailureKind::ImageUnreadable(format!("{}: {}", image.path.display(), e))))?;

        let request = OracleRequest {
            kind: RequestKind::SlideAnalysis,
            slide_number,
            prompt: build_slide_prompt(slide_number, &context.snapshot()),
            image: Some(image_data),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let (response, retries) = self
            .call_with_retry(&request)
            .await
            .map_err(fail)?;

        let text = response
            .first_text()
            .map(clean_analysis)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| fail(FailureKind::EmptyResponse))?;

        let signals = if self.settings.extract_context {
            let signals = self.extract_signals(slide_number, &text, context).await;
            let added = context.record_signals(&signals);
            debug!("Slide {}: {} new context entries", slide_number, added);
            signals
        } else {
            ContextSignals::default()
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Slide {}: analysed in {}ms ({} chars)",
            slide_number,
            duration_ms,
            text.len()
        );

        Ok(SlideAnalysis {
            text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            retries,
            signals,
            duration_ms,
        })
    }

    /// Call the oracle, retrying transient failures with exponential backoff.
    ///
    /// Returns the response and how many retries it took.
    async fn call_with_retry(
        &self,
        request: &OracleRequest,
    ) -> Result<(OracleResponse, u32), FailureKind> {
        let max_retries = self.settings.max_retries;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let backoff = backoff_delay(self.settings.retry_backoff, attempt);
                warn!(
                    "Slide {}: retry {}/{} after {}ms",
                    request.slide_number,
                    attempt,
                    max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.call_once(request).await {
                Ok(response) => return Ok((response, attempt)),
                Err(kind) => {
                    warn!(
                        "Slide {}: attempt {} failed: {}",
                        request.slide_number,
                        attempt + 1,
                        kind
                    );
                    let retryable = match &kind {
                        FailureKind::Provider(e) => e.is_transient(),
                        FailureKind::Timeout { .. } => true,
                        _ => false,
                    };
                    if !retryable || attempt >= max_retries {
                        return Err(kind);
                    }
                }
            }
            attempt += 1;
        }
    }

    /// One oracle call bounded by the configured timeout.
    async fn call_once(&self, request: &OracleRequest) -> Result<OracleResponse, FailureKind> {
        match timeout(self.settings.api_timeout, self.oracle.describe(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(FailureKind::Provider(e)),
            Err(_) => Err(FailureKind::Timeout {
                secs: self.settings.api_timeout.as_secs(),
            }),
        }
    }

    /// Best-effort secondary call; any failure yields empty signals.
    async fn extract_signals(
        &self,
        slide_number: usize,
        analysis: &str,
        context: &PresentationContext,
    ) -> ContextSignals {
        let request = OracleRequest {
            kind: RequestKind::ContextExtraction,
            slide_number,
            prompt: build_context_prompt(analysis, context.audience_description()),
            image: None,
            max_tokens: self.settings.context_max_tokens,
            temperature: self.settings.temperature,
        };

        match self.call_once(&request).await {
            Ok(response) => match response.first_text() {
                Some(text) => parse_context_signals(text),
                None => {
                    debug!("Slide {}: context extraction returned nothing", slide_number);
                    ContextSignals::default()
                }
            },
            Err(kind) => {
                debug!("Slide {}: context extraction skipped: {}", slide_number, kind);
                ContextSignals::default()
            }
        }
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped at
/// [`MAX_RETRY_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_BACKOFF)
        .min(MAX_RETRY_BACKOFF)
}

// ── Context-signal parsing ───────────────────────────────────────────────

static RE_SIGNAL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s\-*#>]*(themes?|concepts?)[\s*]*:[\s*]*(.*)$").expect("valid signal regex")
});

/// Parse a `Themes: a, b` / `Concepts: c, d` reply.
///
/// Matching is case-insensitive and tolerates bullets or bold markup around
/// the prefix. Lines that match neither prefix are ignored; values are split
/// on commas or semicolons, trimmed of quotes, emphasis markers and trailing
/// periods, and placeholders like `none` or `n/a` are dropped.
pub fn parse_context_signals(text: &str) -> ContextSignals {
    let mut signals = ContextSignals::default();

    for line in text.lines() {
        let Some(caps) = RE_SIGNAL_LINE.captures(line) else {
            if !line.trim().is_empty() {
                debug!("Ignoring context line: {:?}", line);
            }
            continue;
        };
        let target = if caps[1].to_lowercase().starts_with("theme") {
            &mut signals.themes
        } else {
            &mut signals.concepts
        };
        target.extend(split_values(&caps[2]));
    }

    if signals.is_empty() {
        debug!(
            "No '{}' or '{}' lines found in context reply",
            THEMES_PREFIX, CONCEPTS_PREFIX
        );
    }
    signals
}

fn split_values(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split([',', ';'])
        .map(|v| {
            v.trim()
                .trim_end_matches('.')
                .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | '`' | '[' | ']'))
                .trim_end_matches('.')
                .trim()
                .to_string()
        })
        .filter(|v| {
            !v.is_empty() && !matches!(v.to_lowercase().as_str(), "none" | "n/a" | "-")
        })
}
