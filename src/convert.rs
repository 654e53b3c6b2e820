//! Conversion orchestration: one upload in, one Markdown file out.
//!
//! [`ConversionService`] sequences the pipeline stages for each uploaded
//! file and aggregates a batch. Files are processed strictly one after the
//! other; the blocking part of each file (converter, image export, file
//! writes) runs on `spawn_blocking` so the HTTP runtime stays responsive.
//!
//! A failure in one file never aborts the batch: it is recorded against the
//! file's name and the next upload is processed. The scratch copy of the
//! upload is removed whether the file succeeded or not.

use crate::config::ServerConfig;
use crate::error::ConvertError;
use crate::pipeline::export::ImageExporter;
use crate::pipeline::extract::DocumentConverter;
use crate::pipeline::input::{self, UploadName};
use crate::pipeline::{rewrite, serialize};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// One file received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename as sent by the client.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// A successfully produced Markdown file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    /// Markdown filename inside the output directory.
    pub name: String,
    /// Relative download URL.
    pub url: String,
    #[serde(skip)]
    pub images_exported: usize,
    #[serde(skip)]
    pub images_skipped: usize,
    #[serde(skip)]
    pub unresolved_refs: usize,
}

/// Per-batch result: what succeeded and what failed, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub files: Vec<ConvertedFile>,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// Every error joined into one message.
    pub fn error_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Runs the conversion pipeline against an immutable configuration.
#[derive(Clone)]
pub struct ConversionService {
    config: Arc<ServerConfig>,
    converter: Arc<dyn DocumentConverter>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.config)
            .field("converter", &"<dyn DocumentConverter>")
            .finish()
    }
}

impl ConversionService {
    pub fn new(config: Arc<ServerConfig>, converter: Arc<dyn DocumentConverter>) -> Self {
        Self { config, converter }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Create the upload, output and image directories.
    pub fn prepare_dirs(&self) -> Result<(), ConvertError> {
        let c = &self.config;
        for dir in [&c.upload_dir, &c.output_dir, &c.image_root()] {
            std::fs::create_dir_all(dir).map_err(|e| ConvertError::OutputWriteFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Convert every upload in order, collecting successes and failures.
    ///
    /// Uploads with an empty filename are skipped without an error.
    pub async fn convert_batch(&self, uploads: Vec<Upload>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for upload in uploads {
            if upload.filename.is_empty() {
                continue;
            }
            let display_name = input::secure_filename(&upload.filename);
            match self.convert_upload(upload).await {
                Ok(file) => outcome.files.push(file),
                Err(e @ ConvertError::UnsupportedFileType { .. }) => {
                    warn!("{}", e);
                    outcome.errors.push(e.to_string());
                }
                Err(e) => {
                    if e.is_validation() {
                        warn!("Rejected {}: {}", display_name, e);
                    } else {
                        error!("Failed processing {}: {}", display_name, e);
                    }
                    outcome
                        .errors
                        .push(format!("Error converting {display_name}: {e}"));
                }
            }
        }

        info!(
            "Batch finished: {} converted, {} failed",
            outcome.files.len(),
            outcome.errors.len()
        );
        outcome
    }

    /// Convert a single upload.
    pub async fn convert_upload(&self, upload: Upload) -> Result<ConvertedFile, ConvertError> {
        let name = UploadName::parse(&upload.filename)?;
        let service = self.clone();

        tokio::task::spawn_blocking(move || service.convert_upload_blocking(&name, &upload.bytes))
            .await
            .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {e}")))?
    }

    /// Blocking body of [`Self::convert_upload`]: stage, convert, clean up.
    pub fn convert_upload_blocking(
        &self,
        name: &UploadName,
        bytes: &[u8],
    ) -> Result<ConvertedFile, ConvertError> {
        let scratch = input::stage_upload(&self.config.upload_dir, name, bytes)?;
        let result = input::verify_pdf_magic(scratch.path())
            .and_then(|()| self.convert_pdf(scratch.path(), &name.basename));
        input::discard_upload(scratch);
        result
    }

    /// Run the pipeline on a PDF already on disk.
    ///
    /// Writes `{output_dir}/{basename}.md` and images under
    /// `{static_dir}/{image_subdir}/{basename}/`.
    pub fn convert_pdf(&self, pdf_path: &Path, basename: &str) -> Result<ConvertedFile, ConvertError> {
        let start = Instant::now();
        let artifacts_dir = self.config.artifacts_dir(basename);

        let result = self.run_stages(pdf_path, basename, &artifacts_dir);

        if self.config.cleanup_artifacts {
            remove_artifacts(&artifacts_dir);
        }

        if let Ok(ref file) = result {
            info!(
                "Converted {} → {} in {}ms ({} images, {} unresolved refs)",
                pdf_path.display(),
                file.name,
                start.elapsed().as_millis(),
                file.images_exported,
                file.unresolved_refs
            );
        }
        result
    }

    fn run_stages(
        &self,
        pdf_path: &Path,
        basename: &str,
        artifacts_dir: &Path,
    ) -> Result<ConvertedFile, ConvertError> {
        // ── Step 1: Convert ──────────────────────────────────────────────
        info!("Processing uploaded file: {}", pdf_path.display());
        let document = self.converter.convert(pdf_path, basename)?;

        // ── Step 2: Export images, build reference map ───────────────────
        info!("Saving extracted images for {} and building URL map", basename);
        let exporter = ImageExporter::new(
            self.config.image_dir(basename),
            self.config.image_url_prefix(basename),
        );
        let report = exporter.export(&document)?;

        // ── Step 3: Serialize ────────────────────────────────────────────
        let raw = serialize::serialize_markdown(&document, self.config.image_ref_mode, artifacts_dir)?;

        // ── Step 4: Rewrite image references ─────────────────────────────
        let rewritten = rewrite::rewrite_image_refs(&raw, &report.refs);

        // ── Step 5: Persist ──────────────────────────────────────────────
        let md_path = self.config.markdown_path(basename);
        write_atomic(&md_path, &rewritten.markdown)?;
        info!("Saved final Markdown: {}", md_path.display());

        let md_name = format!("{basename}.md");
        Ok(ConvertedFile {
            url: self.config.download_url(&md_name),
            name: md_name,
            images_exported: report.exported(),
            images_skipped: report.warnings.len(),
            unresolved_refs: rewritten.unresolved,
        })
    }
}

/// Write via a temp file + rename so readers never see a partial file.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = path.with_extension("md.tmp");
    std::fs::write(&tmp_path, contents).map_err(|e| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn remove_artifacts(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => info!("Removed artifacts directory: {}", dir.display()),
        Err(e) => warn!("Could not remove artifacts directory {}: {}", dir.display(), e),
    }
}
