//! PDF → [`StructuredDocument`] conversion.
//!
//! The pipeline only needs "given a PDF path, give me ordered items with
//! stable self-references and optional picture rasters", so the converter
//! sits behind the [`DocumentConverter`] trait. [`PdfiumConverter`] is the
//! shipped backend; tests and embedders can plug in their own.
//!
//! ## Why synchronous?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state internally and is not safe to call from async contexts. The
//! orchestrator runs the converter inside `tokio::task::spawn_blocking`,
//! so implementations are free to block.

use crate::document::StructuredDocument;
use crate::error::ConvertError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Turns a PDF on disk into a [`StructuredDocument`].
pub trait DocumentConverter: Send + Sync {
    /// Convert the PDF at `pdf_path`. `name` becomes the document name.
    fn convert(&self, pdf_path: &Path, name: &str) -> Result<StructuredDocument, ConvertError>;
}

/// pdfium-backed converter: page text becomes paragraphs, image page objects
/// become pictures, both in page order.
///
/// This is object extraction, not layout analysis: no headings, tables or
/// reading-order repair.
#[derive(Debug, Clone, Default)]
pub struct PdfiumConverter {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumConverter {
    pub fn new(library_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self {
            library_path,
            password,
        }
    }

    /// Bind to pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the
    /// current directory, then the system library path.
    fn bind(&self) -> Result<Pdfium, ConvertError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl DocumentConverter for PdfiumConverter {
    fn convert(&self, pdf_path: &Path, name: &str) -> Result<StructuredDocument, ConvertError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ConvertError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    ConvertError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                ConvertError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut doc = StructuredDocument::new(name);

        for (idx, page) in pages.iter().enumerate() {
            let page_no = idx + 1;

            match page.text() {
                Ok(text) => {
                    for para in split_paragraphs(&text.all()) {
                        doc.push_paragraph(Some(page_no), para);
                    }
                }
                Err(e) => warn!("Page {}: text extraction failed: {:?}", page_no, e),
            }

            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                let image = match image_object.get_raw_image() {
                    Ok(img) => {
                        debug!(
                            "Page {}: picture {}x{} px",
                            page_no,
                            img.width(),
                            img.height()
                        );
                        Some(img)
                    }
                    Err(e) => {
                        warn!("Page {}: could not decode image object: {:?}", page_no, e);
                        None
                    }
                };
                doc.push_picture(Some(page_no), image, None);
            }
        }

        info!(
            "Extracted {} items ({} pictures) from {}",
            doc.len(),
            doc.picture_count(),
            pdf_path.display()
        );
        Ok(doc)
    }
}

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Split raw page text into trimmed, non-empty paragraphs.
///
/// pdfium returns CRLF line endings; paragraphs are separated by blank lines
/// and internal line breaks are kept.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
    RE_PARAGRAPH_BREAK
        .split(&normalised)
        .map(|p| {
            p.lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}
