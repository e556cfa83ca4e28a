//! Result types produced by an analysis run.

use crate::context::ContextSnapshot;
use crate::error::AnalysisFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rendered slide, as persisted by the rasterizer.
///
/// `index` is 1-based and matches the `slide_<n>.png` file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideImage {
    pub index: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl SlideImage {
    /// File name of the rendered image (`slide_<n>.png`).
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::pipeline::render::slide_file_name(self.index))
    }
}

/// Outcome of analysing one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideAnalysisResult {
    /// 1-based slide number.
    pub slide_number: usize,
    /// Structured analysis text, or the failure placeholder.
    pub analysis: String,
    /// Whether `analysis` came from the model.
    pub success: bool,
    /// Location of the rendered image this analysis describes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Why the slide failed, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AnalysisFailure>,
    #[serde(default)]
    pub input_tokens: usize,
    #[serde(default)]
    pub output_tokens: usize,
    #[serde(default)]
    pub duration_ms: u64,
}

impl SlideAnalysisResult {
    pub fn succeeded(slide_number: usize, analysis: String) -> Self {
        Self {
            slide_number,
            analysis,
            success: true,
            image_path: None,
            error: None,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    /// Placeholder entry for a slide whose analysis failed.
    pub fn placeholder(failure: AnalysisFailure) -> Self {
        Self {
            slide_number: failure.slide_number,
            analysis: crate::prompts::failure_placeholder(),
            success: false,
            image_path: None,
            error: Some(failure),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_slides: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub render_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl AnalysisStats {
    /// Tally per-slide outcomes; durations are filled in by the caller.
    pub fn from_results(results: &[SlideAnalysisResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total_slides: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
            output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
            ..Default::default()
        }
    }
}

/// Everything a run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// One entry per input slide, ordered by slide number.
    pub results: Vec<SlideAnalysisResult>,
    /// Flattened context accumulated over the run.
    pub context: ContextSnapshot,
    pub stats: AnalysisStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn placeholder_is_marked_failed() {
        let r = SlideAnalysisResult::placeholder(AnalysisFailure::new(2, FailureKind::EmptyResponse));
        assert_eq!(r.slide_number, 2);
        assert!(!r.success);
        assert_eq!(r.analysis, crate::prompts::failure_placeholder());
        assert!(r.error.is_some());
    }

    #[test]
    fn stats_tally() {
        let results = vec![
            SlideAnalysisResult::succeeded(1, "a".into()),
            SlideAnalysisResult::placeholder(AnalysisFailure::new(2, FailureKind::EmptyResponse)),
            SlideAnalysisResult::succeeded(3, "c".into()),
        ];
        let stats = AnalysisStats::from_results(&results);
        assert_eq!(stats.total_slides, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn result_json_omits_absent_error() {
        let r = SlideAnalysisResult::succeeded(1, "text".into());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["slide_number"], 1);
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn slide_image_file_name() {
        let img = SlideImage {
            index: 4,
            path: PathBuf::from("/tmp/out/slide_4.png"),
            width: 10,
            height: 10,
        };
        assert_eq!(img.file_name(), "slide_4.png");
    }
}
