//! Error types for the edgequake-slides library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`SlidesError`] (**fatal**): the run cannot proceed at all (source file
//!   missing, too large, unrenderable, provider not configured). Returned as
//!   `Err(SlidesError)` from the top-level `analyze*` functions.
//!
//! * [`AnalysisFailure`] (**per-slide**): one slide could not be analysed
//!   (transport error, empty reply, timeout). The orchestrator turns it into a
//!   placeholder [`crate::output::SlideAnalysisResult`] and moves on.
//!
//! * [`OracleError`]: what an [`crate::pipeline::oracle::Oracle`] reports.
//!   The analyzer normalises it into an `AnalysisFailure` tagged with the slide.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-slides library.
#[derive(Debug, Error)]
pub enum SlidesError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("Presentation not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Source exceeds the configured size bound.
    #[error("Presentation '{path}' is {size} bytes, limit is {max} bytes")]
    SourceTooLarge { path: PathBuf, size: u64, max: u64 },

    /// The file was read but is not a format the rasterizer understands.
    #[error("Unsupported presentation format: '{path}'\nFirst bytes: {magic:?}. Export the deck to PDF first.")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// Rendering or persisting a page failed.
    #[error("Rendering failed for slide {page}: {detail}")]
    RenderFailure { page: usize, detail: String },

    /// Document structure is corrupt and cannot be parsed.
    #[error("Presentation '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("Presentation '{path}' is encrypted.\nProvide the password with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Integrity ─────────────────────────────────────────────────────────
    /// Result count differs from the slide count. Logged, never returned.
    #[error("Integrity mismatch: {actual} results for {expected} slides")]
    IntegrityMismatch { expected: usize, actual: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by the vision oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum OracleError {
    /// Provider could not be reached or answered with a server error.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider throttled the request (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OracleError {
    /// Classify a provider error message.
    ///
    /// Provider SDKs surface status codes inside their messages, so matching on
    /// the text is the only portable signal.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            OracleError::RateLimited(message)
        } else if lower.contains("400")
            || lower.contains("invalid")
            || lower.contains("unsupported")
            || lower.contains("content_filter")
        {
            OracleError::InvalidRequest(message)
        } else {
            OracleError::ProviderUnavailable(message)
        }
    }

    /// Whether retrying the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, OracleError::InvalidRequest(_))
    }
}

/// Why a single slide's analysis failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FailureKind {
    /// Transport or provider failure.
    #[error("{0}")]
    Provider(OracleError),

    /// The oracle answered without any usable text.
    #[error("empty response from model")]
    EmptyResponse,

    /// The oracle did not answer within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The rendered slide could not be read back for encoding.
    #[error("slide image unreadable: {0}")]
    ImageUnreadable(String),
}

/// A non-fatal error for a single slide.
///
/// Stored alongside [`crate::output::SlideAnalysisResult`] when a slide fails.
/// The batch always continues with the next slide.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Slide {slide_number}: analysis failed: {kind}")]
pub struct AnalysisFailure {
    pub slide_number: usize,
    pub kind: FailureKind,
}

impl AnalysisFailure {
    pub fn new(slide_number: usize, kind: FailureKind) -> Self {
        Self { slide_number, kind }
    }
}
