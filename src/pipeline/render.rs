//! Rasterisation: turn a presentation into `slide_<n>.png` files.
//!
//! The [`Rasterizer`] trait is the boundary the orchestrator depends on;
//! [`PdfiumRasterizer`] is the production implementation. Whatever produces
//! the pixels, persistence goes through [`persist_slide`] so every slide on
//! disk obeys the same rules:
//!
//! - the output directory is purged of stale `*.png` before a run,
//! - file names encode the 1-based slide index,
//! - neither edge exceeds the configured bound (Lanczos3 downsampling,
//!   aspect ratio preserved),
//! - a file that is not verifiably on disk after writing is a
//!   [`SlidesError::RenderFailure`].
//!
//! pdfium is not async-safe, so rendering runs inside `spawn_blocking`.

use crate::error::SlidesError;
use crate::output::SlideImage;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Capability that renders a source document into ordered slide images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of `source` into `output_dir`, in page order.
    ///
    /// Implementations must clear previously rendered slides from
    /// `output_dir` first.
    async fn render(&self, source: &Path, output_dir: &Path) -> Result<Vec<SlideImage>, SlidesError>;
}

/// File name for a 1-based slide index.
pub fn slide_file_name(index: usize) -> String {
    format!("slide_{index}.png")
}

/// Remove previously rendered `*.png` files, creating `dir` if needed.
///
/// Returns how many files were removed. Non-PNG files are left alone.
pub fn clear_rendered_slides(dir: &Path) -> Result<usize, SlidesError> {
    let write_err = |source| SlidesError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut removed = 0;
    for entry in std::fs::read_dir(dir).map_err(write_err)? {
        let path = entry.map_err(write_err)?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            std::fs::remove_file(&path).map_err(|source| SlidesError::OutputWriteFailed {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Removed {} stale slide images from {}", removed, dir.display());
    }
    Ok(removed)
}

/// Downscale `image` so neither edge exceeds `max_pixels`.
pub fn fit_within(image: DynamicImage, max_pixels: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w <= max_pixels && h <= max_pixels {
        image
    } else {
        image.resize(max_pixels, max_pixels, FilterType::Lanczos3)
    }
}

/// Resize and write one slide, then verify it landed on disk.
pub fn persist_slide(
    image: DynamicImage,
    index: usize,
    output_dir: &Path,
    max_pixels: u32,
) -> Result<SlideImage, SlidesError> {
    let image = fit_within(image, max_pixels);
    let path = output_dir.join(slide_file_name(index));

    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| SlidesError::RenderFailure {
            page: index,
            detail: format!("could not write {}: {}", path.display(), e),
        })?;

    let written = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(SlidesError::RenderFailure {
            page: index,
            detail: format!("{} missing or empty after write", path.display()),
        });
    }

    let (width, height) = image.dimensions();
    info!("Saved slide {}: {} ({}x{})", index, path.display(), width, height);
    Ok(SlideImage {
        index,
        path,
        width,
        height,
    })
}

/// Clear `output_dir`, then persist `images` as slides 1..=n.
pub fn persist_slides(
    images: Vec<DynamicImage>,
    output_dir: &Path,
    max_pixels: u32,
) -> Result<Vec<SlideImage>, SlidesError> {
    clear_rendered_slides(output_dir)?;
    images
        .into_iter()
        .enumerate()
        .map(|(i, img)| persist_slide(img, i + 1, output_dir, max_pixels))
        .collect()
}

/// Renders PDF pages through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    password: Option<String>,
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            password: None,
            lib_path: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_lib_path(mut self, lib_path: Option<PathBuf>) -> Self {
        self.lib_path = lib_path;
        self
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn render(&self, source: &Path, output_dir: &Path) -> Result<Vec<SlideImage>, SlidesError> {
        let this = self.clone();
        let source = source.to_path_buf();
        let output_dir = output_dir.to_path_buf();

        tokio::task::spawn_blocking(move || this.render_blocking(&source, &output_dir))
            .await
            .map_err(|e| SlidesError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRasterizer {
    fn render_blocking(&self, source: &Path, output_dir: &Path) -> Result<Vec<SlideImage>, SlidesError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let document = pdfium
            .load_pdf_from_file(source, self.password.as_deref())
            .map_err(|e| {
                let detail = format!("{:?}", e);
                if detail.to_lowercase().contains("password") {
                    SlidesError::PasswordRequired {
                        path: source.to_path_buf(),
                    }
                } else {
                    SlidesError::CorruptDocument {
                        path: source.to_path_buf(),
                        detail,
                    }
                }
            })?;

        let pages = document.pages();
        info!("Presentation loaded: {} pages", pages.len());

        clear_rendered_slides(output_dir)?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut slides = Vec::with_capacity(pages.len() as usize);
        for (i, page) in pages.iter().enumerate() {
            let index = i + 1;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| SlidesError::RenderFailure {
                    page: index,
                    detail: format!("{:?}", e),
                })?;
            slides.push(persist_slide(bitmap.as_image(), index, output_dir, self.max_pixels)?);
        }

        Ok(slides)
    }
}

/// Bind to libpdfium at `lib_path` (file or directory), else the system library.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, SlidesError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(p.join(Pdfium::pdfium_platform_library_name()))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| SlidesError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn file_names_are_one_based() {
        assert_eq!(slide_file_name(1), "slide_1.png");
        assert_eq!(slide_file_name(12), "slide_12.png");
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        let img = fit_within(solid(4000, 1000), 2000);
        assert_eq!(img.dimensions(), (2000, 500));
    }

    #[test]
    fn fit_within_leaves_small_images() {
        let img = fit_within(solid(300, 200), 2000);
        assert_eq!(img.dimensions(), (300, 200));
    }

    #[test]
    fn persist_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let slides = persist_slides(vec![solid(20, 10), solid(10, 20)], dir.path(), 2000).unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0].index, 1);
        assert!(dir.path().join("slide_1.png").is_file());
        assert!(dir.path().join("slide_2.png").is_file());
        assert_eq!((slides[1].width, slides[1].height), (10, 20));
    }

    #[test]
    fn persist_downscales_large_pages() {
        let dir = tempfile::tempdir().unwrap();
        let slide = persist_slide(solid(600, 300), 1, dir.path(), 200).unwrap();
        assert_eq!((slide.width, slide.height), (200, 100));
        let on_disk = image::open(&slide.path).unwrap();
        assert_eq!(on_disk.dimensions(), (200, 100));
    }

    #[test]
    fn clear_removes_only_png() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("slide_9.png"), b"stale").unwrap();
        std::fs::write(dir.path().join(".gitkeep"), b"").unwrap();
        let removed = clear_rendered_slides(dir.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join(".gitkeep").exists());
    }

    #[test]
    fn rerun_purges_stale_slides() {
        let dir = tempfile::tempdir().unwrap();
        persist_slides(vec![solid(5, 5), solid(5, 5), solid(5, 5)], dir.path(), 100).unwrap();
        persist_slides(vec![solid(5, 5)], dir.path(), 100).unwrap();
        assert!(dir.path().join("slide_1.png").exists());
        assert!(!dir.path().join("slide_2.png").exists());
        assert!(!dir.path().join("slide_3.png").exists());
    }

    #[test]
    fn clear_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        assert_eq!(clear_rendered_slides(&nested).unwrap(), 0);
        assert!(nested.is_dir());
    }
}
