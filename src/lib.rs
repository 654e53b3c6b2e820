//! # edgequake-pdf2md-server
//!
//! An HTTP service that converts uploaded PDFs to Markdown and publishes the
//! embedded images as static files, so the Markdown links to real URLs
//! instead of document-internal references.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (files[])
//!  │
//!  ├─ 1. Input      extension check, secure filename, scratch file, %PDF check
//!  ├─ 2. Extract    pdfium → StructuredDocument (CPU-bound, spawn_blocking)
//!  ├─ 3. Export     pictures → {static}/images/{basename}/{uuid}_*.png + ref map
//!  ├─ 4. Serialize  StructuredDocument → Markdown (self-ref / referenced / …)
//!  ├─ 5. Rewrite    exact match, then positional fallback → public URLs
//!  └─ 6. Output     {output_dir}/{basename}.md, served at /download_md/
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2md_server::{AppState, ConversionService, PdfiumConverter, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ServerConfig::builder().port(5000).build()?);
//!     let converter = Arc::new(PdfiumConverter::new(None, None));
//!     let service = ConversionService::new(config, converter);
//!     service.prepare_dirs()?;
//!     edgequake_pdf2md_server::server::serve(AppState::new(service)).await?;
//!     Ok(())
//! }
//! ```
//!
//! The rewriter is usable on its own:
//!
//! ```rust
//! use edgequake_pdf2md_server::{rewrite, ReferenceMap};
//!
//! let mut refs = ReferenceMap::new();
//! refs.insert("#/pictures/0".into(), "http://h/static/images/a/x.png".into());
//! let md = rewrite("![Fig](a_artifacts/image_000000_ab12.png)", &refs);
//! assert_eq!(md, "![Fig](http://h/static/images/a/x.png)");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ImageRefMode, ServerConfig, ServerConfigBuilder};
pub use convert::{BatchOutcome, ConversionService, ConvertedFile, Upload};
pub use document::{DocItem, ItemKind, PictureItem, StructuredDocument};
pub use error::{ConvertError, ExportWarning};
pub use pipeline::export::{ExportReport, ImageExporter, ReferenceMap};
pub use pipeline::extract::{DocumentConverter, PdfiumConverter};
pub use pipeline::rewrite::{rewrite, rewrite_image_refs, RewriteOutcome};
pub use server::{router, AppError, AppState};
