//! Pipeline stages for PDF-to-Markdown conversion with image reconciliation.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. another converter backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ export ──▶ serialize ──▶ rewrite
//! (upload)  (pdfium)    (PNGs)     (markdown)    (URLs)
//! ```
//!
//! 1. [`input`]: validate the extension, sanitise the name, stage the
//!    upload in a scratch file and check the PDF magic bytes
//! 2. [`extract`]: turn the PDF into a [`crate::document::StructuredDocument`]
//! 3. [`export`]: write picture rasters and build the `self_ref` → URL map
//! 4. [`serialize`]: render the document as Markdown in the configured
//!    image-reference mode
//! 5. [`rewrite`]: replace image sources with exported URLs

pub mod export;
pub mod extract;
pub mod input;
pub mod rewrite;
pub mod serialize;
