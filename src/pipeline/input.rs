//! Source resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium needs a file-system path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the returned [`ResolvedSource`]. Size and
//! PDF magic bytes are checked here so the rasterizer only ever sees a file
//! it can plausibly open.

use crate::error::SlidesError;
use futures::StreamExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// The resolved source document: either a local path or a downloaded temp file.
pub enum ResolvedSource {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the document lives in a temp directory kept alive here.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedSource {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedSource::Local(p) => p,
            ResolvedSource::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local document path.
pub async fn resolve_source(
    input: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedSource, SlidesError> {
    if input.trim().is_empty() {
        return Err(SlidesError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, max_bytes, timeout_secs).await
    } else {
        resolve_local(Path::new(input), max_bytes).map(ResolvedSource::Local)
    }
}

/// Validate a local file: existence, readability, size bound and PDF magic.
pub fn resolve_local(path: &Path, max_bytes: u64) -> Result<PathBuf, SlidesError> {
    let path = path.to_path_buf();

    let meta = std::fs::metadata(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => SlidesError::PermissionDenied { path: path.clone() },
        _ => SlidesError::SourceNotFound { path: path.clone() },
    })?;
    if !meta.is_file() {
        return Err(SlidesError::SourceNotFound { path });
    }
    if meta.len() > max_bytes {
        return Err(SlidesError::SourceTooLarge {
            path,
            size: meta.len(),
            max: max_bytes,
        });
    }

    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SlidesError::PermissionDenied { path });
        }
        Err(_) => return Err(SlidesError::SourceNotFound { path }),
    };

    // Files shorter than the magic are rejected too.
    let mut head = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut head)
        .map_err(|e| SlidesError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
    if head != b"%PDF" {
        let mut magic = [0u8; 4];
        magic[..head.len()].copy_from_slice(&head);
        return Err(SlidesError::UnsupportedFormat { path, magic });
    }

    debug!("Resolved local presentation: {}", path.display());
    Ok(path)
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(
    url: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedSource, SlidesError> {
    info!("Downloading presentation from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SlidesError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SlidesError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SlidesError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(SlidesError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(SlidesError::SourceTooLarge {
                path: PathBuf::from(url),
                size: len,
                max: max_bytes,
            });
        }
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| SlidesError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let mut file = tokio::fs::File::create(&file_path)
        .await
        .map_err(|e| SlidesError::Internal(format!("Failed to create temp file: {}", e)))?;

    // Chunked responses carry no content length, so the bound is enforced
    // on the running total and the transfer stops as soon as it is crossed.
    let mut received: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| SlidesError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        received += chunk.len() as u64;
        if received > max_bytes {
            warn!(
                "Aborting download of {} after {} bytes (limit {})",
                url, received, max_bytes
            );
            return Err(SlidesError::SourceTooLarge {
                path: PathBuf::from(url),
                size: received,
                max: max_bytes,
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| SlidesError::Internal(format!("Failed to write temp file: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| SlidesError::Internal(format!("Failed to write temp file: {}", e)))?;
    drop(file);

    resolve_local(&file_path, max_bytes)?;

    info!("Downloaded to: {}", file_path.display());
    Ok(ResolvedSource::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "presentation.pdf".to_string()
}
