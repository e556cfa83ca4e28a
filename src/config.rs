//! Configuration types for slide deck analysis.
//!
//! All run behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. One struct holds every knob so a config can be
//! cloned into each request handler and logged as a whole.

use crate::error::SlidesError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default bound on the source document size (50 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

/// Upper bound on retries per oracle call.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for a slide analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_slides::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .output_dir("out/slides")
///     .model("gpt-4o-mini")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Directory receiving `slide_<n>.png`. Default: `output/slides`.
    ///
    /// Every run clears the PNGs already in here before rendering, so two
    /// concurrent runs must never share a directory.
    pub output_dir: PathBuf,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Largest accepted source document in bytes. Default: 50 MiB.
    pub max_source_bytes: u64,

    /// Oracle model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both oracle calls. Default: 0.2.
    pub temperature: f32,

    /// Token ceiling for the per-slide analysis call. Default: 4096.
    pub max_tokens: usize,

    /// Token ceiling for the context-extraction call. Default: 256.
    ///
    /// The extraction reply is two short lines; a small budget keeps the
    /// secondary call cheap.
    pub context_max_tokens: usize,

    /// Issue the secondary theme/concept extraction call. Default: true.
    pub extract_context: bool,

    /// Retry attempts on a transient oracle failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-oracle-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Location of libpdfium (file or containing directory).
    /// If None, the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Receives per-slide progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/slides"),
            max_rendered_pixels: 2000,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            context_max_tokens: 256,
            extract_context: true,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            password: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("output_dir", &self.output_dir)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("context_max_tokens", &self.context_max_tokens)
            .field("extract_context", &self.extract_context)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier sent to the oracle.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_source_bytes(mut self, bytes: u64) -> Self {
        self.config.max_source_bytes = bytes;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn context_max_tokens(mut self, n: usize) -> Self {
        self.config.context_max_tokens = n;
        self
    }

    pub fn extract_context(mut self, v: bool) -> Self {
        self.config.extract_context = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES_LIMIT);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, SlidesError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(SlidesError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.extract_context && c.context_max_tokens == 0 {
            return Err(SlidesError::InvalidConfig(
                "context_max_tokens must be ≥ 1 when context extraction is enabled".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(SlidesError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_source_bytes == 0 {
            return Err(SlidesError::InvalidConfig(
                "max_source_bytes must be ≥ 1".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(SlidesError::InvalidConfig(
                "output_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
