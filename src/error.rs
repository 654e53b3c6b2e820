//! Error types for the edgequake-pdf2md-server library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`]: **Fatal for one file**: the upload cannot be turned
//!   into Markdown at all (wrong extension, not a PDF, converter failure,
//!   output not writable). The orchestrator records it against the file and
//!   moves on to the next upload in the batch.
//!
//! * [`ExportWarning`]: **Non-fatal**: a single picture could not be
//!   exported (no pixel data, PNG write failed). The picture simply gets no
//!   entry in the reference map and its Markdown tag is left as emitted.
//!
//! HTTP-level failures live in [`crate::server::AppError`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the conversion of a single uploaded file.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation errors ────────────────────────────────────────────────
    /// Upload extension is not in the allow-list.
    #[error("File type not allowed for {filename}")]
    UnsupportedFileType { filename: String },

    /// Filename sanitises down to nothing usable.
    #[error("Invalid filename '{filename}'")]
    InvalidFilename { filename: String },

    /// The upload was written, but its first bytes are not `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Converter errors ─────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was configured.
    #[error("PDF '{path}' is encrypted and requires a password.\nStart the server with --pdf-password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was configured but it is wrong for this file.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    /// The converter backend failed for a reason not covered above.
    #[error("Conversion failed: {detail}")]
    ConverterFailed { detail: String },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not persist the uploaded bytes to the scratch directory.
    #[error("Failed to store upload '{path}': {source}")]
    UploadWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file or directory.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an image artifact during referenced serialization.
    #[error("Failed to write image artifact '{path}': {detail}")]
    ArtifactWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// True for errors caused by what the client sent rather than by the
    /// server or the converter.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedFileType { .. }
                | ConvertError::InvalidFilename { .. }
                | ConvertError::NotAPdf { .. }
        )
    }
}

/// A non-fatal problem with a single picture during image export.
///
/// Collected in [`crate::pipeline::export::ExportReport`]; never surfaced to
/// the HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ExportWarning {
    /// The picture element carries no decoded raster.
    #[error("Skipping picture {self_ref}: no image data found")]
    MissingImageData { self_ref: String },

    /// Writing the PNG failed.
    #[error("Could not save image {self_ref}: {detail}")]
    SaveFailed { self_ref: String, detail: String },
}
