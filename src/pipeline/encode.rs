//! Image encoding: rendered slide file → base64 PNG wrapped in `ImageData`.
//!
//! Slides are already PNG on disk, so encoding is read + base64. PNG keeps
//! small slide text crisp, which matters more than payload size here.

use crate::output::SlideImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Base64-encode raw PNG bytes for the vision API.
pub fn encode_png_bytes(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Read a rendered slide back from disk and encode it.
pub async fn encode_slide(slide: &SlideImage) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(&slide.path).await?;
    Ok(encode_png_bytes(&bytes))
}
