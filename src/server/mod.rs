//! HTTP surface (feature `server`).
//!
//! A small axum app over the library: upload a PDF, analyse it for an
//! audience, fetch the rendered slide images. Shared state holds only
//! stateless capabilities (provider, rasteriser) and directory settings.
//! Presentation context is never shared: each `/analyze` call owns a fresh
//! one and its own output directory.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{secure_filename, AnalyzeRequest, AnalyzeResponse, UploadResponse, UPLOAD_FIELD};

use crate::config::AnalysisConfig;
use crate::error::SlidesError;
use crate::orchestrator::{build_oracle, pdfium_rasterizer};
use crate::pipeline::oracle::Oracle;
use crate::pipeline::render::Rasterizer;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Largest accepted request body (uploads included).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Run directories kept under `output_root` before the oldest are pruned.
pub const DEFAULT_RETAINED_RUNS: usize = 16;

/// Where the server keeps files.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Uploaded PDFs land here.
    pub upload_dir: PathBuf,
    /// Each analysis renders into `<output_root>/<run_id>/`.
    pub output_root: PathBuf,
    pub max_upload_bytes: usize,
    /// How many run directories survive each `/analyze` call (the one just
    /// written always does).
    pub retained_runs: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_root: PathBuf::from("output/slides"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retained_runs: DEFAULT_RETAINED_RUNS,
        }
    }
}

/// Shared, cheaply cloneable application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: AnalysisConfig,
    settings: ServerSettings,
    rasterizer: Arc<dyn Rasterizer>,
    oracle: Arc<dyn Oracle>,
}

impl AppState {
    /// Production state: pdfium rendering and the provider resolved from `config`.
    pub fn new(config: AnalysisConfig, settings: ServerSettings) -> Result<Self, SlidesError> {
        let oracle = build_oracle(&config)?;
        let rasterizer = Arc::new(pdfium_rasterizer(&config));
        Ok(Self::with_capabilities(config, settings, rasterizer, oracle))
    }

    pub fn with_capabilities(
        config: AnalysisConfig,
        settings: ServerSettings,
        rasterizer: Arc<dyn Rasterizer>,
        oracle: Arc<dyn Oracle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                settings,
                rasterizer,
                oracle,
            }),
        }
    }

    pub fn analysis_config(&self) -> &AnalysisConfig {
        &self.inner.config
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.settings.upload_dir
    }

    pub fn output_root(&self) -> &Path {
        &self.inner.settings.output_root
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.settings.max_upload_bytes
    }

    pub fn retained_runs(&self) -> usize {
        self.inner.settings.retained_runs
    }

    pub fn rasterizer(&self) -> &dyn Rasterizer {
        self.inner.rasterizer.as_ref()
    }

    pub fn oracle(&self) -> Arc<dyn Oracle> {
        Arc::clone(&self.inner.oracle)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/analyze", post(handlers::analyze))
        .nest_service("/slides", ServeDir::new(state.output_root()))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
