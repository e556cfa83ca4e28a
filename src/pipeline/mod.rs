//! Pipeline stages for slide-deck analysis.
//!
//! Each submodule implements exactly one step. The orchestrator wires them
//! together; tests swap the two external capabilities ([`render::Rasterizer`]
//! and [`oracle::Oracle`]) for fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ oracle ──▶ postprocess
//! (URL/path)  (pdfium)   (base64)   (VLM)      (cleanup)
//!                                     ▲
//!                               analyzer drives
//! ```
//!
//! 1. [`input`]: canonicalise a path or URL to a validated local PDF
//! 2. [`render`]: rasterise every page to `slide_<n>.png`; pdfium runs in
//!    `spawn_blocking` because it is not async-safe
//! 3. [`encode`]: read the PNG back and base64-wrap it for the request body
//! 4. [`oracle`]: the only stage with network I/O
//! 5. [`analyzer`]: prompt, retry, validate, extract context signals
//! 6. [`postprocess`]: deterministic text cleanup

pub mod analyzer;
pub mod encode;
pub mod input;
pub mod oracle;
pub mod postprocess;
pub mod render;
