//! Route handlers.
//!
//! Endpoints:
//! - POST /upload - store one PDF from multipart field `files[]`
//! - POST /analyze - render + analyse an uploaded PDF for an audience
//! - GET /slides/:run_id/:file - rendered slide images (served by `ServeDir`)
//! - GET /health - liveness

use super::error::ApiError;
use super::AppState;
use crate::context::ContextSnapshot;
use crate::orchestrator::analyze_with;
use crate::output::{AnalysisStats, SlideAnalysisResult};
use crate::pipeline::input::is_url;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Multipart field name the upload form uses.
pub const UPLOAD_FIELD: &str = "files[]";

// ============================================================================
// Upload
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub filepath: String,
}

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, state.max_upload_bytes()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if !has_pdf_extension(&original) {
            return Err(ApiError::InvalidFileType(original));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, state.max_upload_bytes()))?;

        let filename = secure_filename(&original);
        tokio::fs::create_dir_all(state.upload_dir()).await?;
        let filepath = state.upload_dir().join(&filename);
        tokio::fs::write(&filepath, &bytes).await?;

        tracing::info!(
            filename = %filename,
            size = bytes.len(),
            "Upload stored"
        );

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            filename,
            filepath: filepath.display().to_string(),
        }));
    }

    Err(ApiError::NoFile)
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { max }
    } else {
        ApiError::Multipart(e.body_text())
    }
}

fn has_pdf_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied file name to a safe, flat name.
///
/// Directory components are dropped, anything outside `[A-Za-z0-9._-]`
/// becomes `_`, and leading dots are stripped.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

// ============================================================================
// Analyze
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// Path returned by `/upload`.
    #[serde(default)]
    pub filepath: Option<String>,
    /// Bare file name inside the upload directory.
    #[serde(default)]
    pub filename: Option<String>,
    /// Who the presentation is for.
    #[serde(default, alias = "context")]
    pub audience_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub run_id: String,
    pub results: Vec<SlideAnalysisResult>,
    pub context: ContextSnapshot,
    pub stats: AnalysisStats,
}

/// POST /analyze
///
/// Every request renders into its own `<output_root>/<run_id>/` directory
/// and analyses against a context nothing else can see.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let source = resolve_upload(state.upload_dir(), &request)?;
    let audience = request.audience_description.unwrap_or_default();

    let run_id = Uuid::new_v4().to_string();
    let mut config = state.analysis_config().clone();
    config.output_dir = state.output_root().join(&run_id);

    tracing::info!(
        run_id = %run_id,
        source = %source.display(),
        audience = %audience,
        "Analysis requested"
    );

    let output = analyze_with(
        source.to_string_lossy(),
        &audience,
        &config,
        state.rasterizer(),
        state.oracle(),
    )
    .await?;

    match prune_runs(state.output_root(), state.retained_runs(), &run_id).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(removed = n, "Pruned old runs"),
        Err(e) => tracing::warn!("Failed to prune old runs: {}", e),
    }

    let results = output
        .results
        .into_iter()
        .map(|r| {
            let file = r
                .image_path
                .as_deref()
                .and_then(|p| Path::new(p).file_name())
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| crate::pipeline::render::slide_file_name(r.slide_number));
            let url = format!("/slides/{}/{}", run_id, file);
            r.with_image_path(url)
        })
        .collect();

    Ok(Json(AnalyzeResponse {
        success: true,
        run_id,
        results,
        context: output.context,
        stats: output.stats,
    }))
}

/// Map the request onto a file inside `upload_dir`.
///
/// URLs are never accepted here: the server only analyses what was uploaded.
fn resolve_upload(upload_dir: &Path, request: &AnalyzeRequest) -> Result<PathBuf, ApiError> {
    if let Some(name) = request.filename.as_deref().filter(|n| !n.trim().is_empty()) {
        return Ok(upload_dir.join(secure_filename(name)));
    }

    let raw = request
        .filepath
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ApiError::MissingSource)?;
    if is_url(raw.trim()) {
        return Err(ApiError::InvalidPath(raw.to_string()));
    }

    let path = PathBuf::from(raw);
    let root = upload_dir
        .canonicalize()
        .unwrap_or_else(|_| upload_dir.to_path_buf());

    if let Ok(canonical) = path.canonicalize() {
        return if canonical.starts_with(&root) {
            Ok(canonical)
        } else {
            Err(ApiError::InvalidPath(raw.to_string()))
        };
    }

    // Not on disk: confine lexically, then let the pipeline report SourceNotFound.
    let climbs = path.components().any(|c| matches!(c, Component::ParentDir));
    if !climbs && (path.starts_with(upload_dir) || path.starts_with(&root)) {
        Ok(path)
    } else {
        Err(ApiError::InvalidPath(raw.to_string()))
    }
}

/// Remove the oldest run directories under `output_root` so at most `keep`
/// remain. `current` is never removed. Only directories named by a run id
/// are considered.
pub(crate) async fn prune_runs(
    output_root: &Path,
    keep: usize,
    current: &str,
) -> std::io::Result<usize> {
    let mut runs = Vec::new();
    let mut entries = tokio::fs::read_dir(output_root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == current || Uuid::parse_str(&name).is_err() {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            runs.push((meta.modified()?, entry.path()));
        }
    }

    // The current run takes one of the `keep` slots.
    let others = keep.saturating_sub(1);
    if runs.len() <= others {
        return Ok(0);
    }
    runs.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in runs.into_iter().skip(others) {
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to prune {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
