//! # edgequake-slides
//!
//! Audience-aware slide-deck analysis using Vision Language Models (VLMs).
//!
//! Each page of a presentation is rasterised to a PNG and shown to a VLM
//! together with a description of who will be watching. The model answers
//! with a fixed structure (summary, key points, emphasis keywords) tailored
//! to that audience. Themes and concepts picked up along the way are carried
//! forward, so slide 12 is explained in light of what slides 1–11 covered.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise pages to slide_<n>.png (pdfium, spawn_blocking)
//!  ├─ 3. Encode   PNG → base64 ImageData
//!  ├─ 4. Analyse  one VLM call per slide, strictly in order
//!  ├─ 5. Context  optional second call: themes/concepts → context store
//!  └─ 6. Output   ordered results + context snapshot + stats
//! ```
//!
//! A slide whose analysis fails never aborts the run: it is replaced by a
//! placeholder marked `success: false`, and the result list always has one
//! entry per slide.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_slides::{analyze_document, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AnalysisConfig::default();
//!     let output = analyze_document("deck.pdf", "junior engineers", &config).await?;
//!     for slide in &output.results {
//!         println!("## Slide {}\n{}", slide.slide_number, slide.analysis);
//!     }
//!     eprintln!("themes: {:?}", output.context.themes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `slides-analyze` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | Enables the `slides-server` binary and [`server`] module (axum + tower-http) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use context::{ContextSignals, ContextSnapshot, PresentationContext};
pub use error::{AnalysisFailure, FailureKind, OracleError, SlidesError};
pub use orchestrator::{
    analyze_document, analyze_from_bytes, analyze_sync, analyze_to_file, analyze_with, run,
};
pub use output::{AnalysisOutput, AnalysisStats, SlideAnalysisResult, SlideImage};
pub use pipeline::analyzer::{parse_context_signals, AnalyzerSettings, SlideAnalyzer};
pub use pipeline::oracle::{LlmOracle, Oracle, OracleRequest, OracleResponse};
pub use pipeline::render::{clear_rendered_slides, PdfiumRasterizer, Rasterizer};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use stream::{analyze_stream, analyze_stream_with, SlideStream};
