//! Image export: persist picture rasters and build the reference map.
//!
//! Each picture that carries decoded pixels is written as
//! `{uuid}_{sanitised self_ref}.png` into a per-document directory, and its
//! `self_ref` is mapped to the public URL of that file. The random prefix
//! keeps two requests (or two exports of the same document) from ever
//! overwriting each other's files.
//!
//! Pictures without pixels and pictures whose PNG write fails are recorded
//! as [`ExportWarning`]s and left out of the map; the rewriter then leaves
//! their Markdown tags untouched.

use crate::document::StructuredDocument;
use crate::error::{ConvertError, ExportWarning};
use crate::pipeline::input::secure_filename;
use image::ImageFormat;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// `self_ref` → external URL, one entry per exported picture.
pub type ReferenceMap = HashMap<String, String>;

/// Result of one export run.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub refs: ReferenceMap,
    /// Picture items seen, with or without data.
    pub pictures_seen: usize,
    pub warnings: Vec<ExportWarning>,
}

impl ExportReport {
    pub fn exported(&self) -> usize {
        self.refs.len()
    }
}

/// Writes a document's pictures into one directory and maps them to URLs.
#[derive(Debug, Clone)]
pub struct ImageExporter {
    output_dir: PathBuf,
    url_prefix: String,
}

impl ImageExporter {
    /// `url_prefix` is the public URL of `output_dir`, without trailing slash.
    pub fn new(output_dir: impl AsRef<Path>, url_prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export every picture of `document` that has image data.
    ///
    /// # Errors
    /// Only when the output directory cannot be created. Individual image
    /// failures are reported in [`ExportReport::warnings`].
    pub fn export(&self, document: &StructuredDocument) -> Result<ExportReport, ConvertError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            ConvertError::OutputWriteFailed {
                path: self.output_dir.clone(),
                source: e,
            }
        })?;

        let mut report = ExportReport::default();
        let mut ordinal = 0usize;

        for (item, picture) in document.pictures() {
            report.pictures_seen += 1;

            let Some(image) = picture.image.as_ref() else {
                let warning = ExportWarning::MissingImageData {
                    self_ref: item.self_ref.clone(),
                };
                warn!("{}", warning);
                report.warnings.push(warning);
                continue;
            };

            ordinal += 1;
            let filename = format!(
                "{}_{}.png",
                Uuid::new_v4(),
                image_file_stem(&item.self_ref, ordinal)
            );
            let path = self.output_dir.join(&filename);

            match image.save_with_format(&path, ImageFormat::Png) {
                Ok(()) => {
                    debug!("Saved extracted image: {}", path.display());
                    let url = format!("{}/{}", self.url_prefix, filename);
                    report.refs.insert(item.self_ref.clone(), url);
                }
                Err(e) => {
                    let warning = ExportWarning::SaveFailed {
                        self_ref: item.self_ref.clone(),
                        detail: e.to_string(),
                    };
                    error!("{}", warning);
                    report.warnings.push(warning);
                    remove_partial(&path);
                }
            }
        }

        info!(
            "Exported {}/{} pictures of '{}' to {}",
            report.exported(),
            report.pictures_seen,
            document.name,
            self.output_dir.display()
        );
        Ok(report)
    }
}

/// The encoder may fail after the file was created; drop what it left.
fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial image {}: {}", path.display(), e),
    }
}

/// Filesystem-safe stem derived from a self-reference.
///
/// `#/pictures/3` becomes `pictures_3`. When nothing usable survives,
/// `image_{ordinal}` is used instead.
pub fn image_file_stem(self_ref: &str, ordinal: usize) -> String {
    let flattened = self_ref.replace('/', "_").replace('#', "");
    let safe = secure_filename(&flattened);
    if safe.is_empty() {
        format!("image_{ordinal}")
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb32FImage, Rgba, RgbaImage};

    fn pixel(r: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([r, 0, 0, 255])))
    }

    fn doc_with(pictures: &[bool]) -> StructuredDocument {
        let mut doc = StructuredDocument::new("sample");
        doc.push_title(Some(1), "Sample");
        for (i, has_data) in pictures.iter().enumerate() {
            doc.push_paragraph(Some(1), format!("before picture {i}"));
            let image = has_data.then(|| pixel(i as u8));
            doc.push_picture(Some(1), image, None);
        }
        doc
    }

    #[test]
    fn image_file_stem_sanitises_self_ref() {
        assert_eq!(image_file_stem("#/pictures/3", 1), "pictures_3");
        assert_eq!(image_file_stem("#/", 4), "image_4");
        assert_eq!(image_file_stem("", 2), "image_2");
    }

    #[test]
    fn map_has_one_entry_per_picture_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(dir.path().join("sample"), "http://h/static/images/sample");

        let doc = doc_with(&[true, false, true, true, false]);
        let report = exporter.export(&doc).unwrap();

        assert_eq!(report.pictures_seen, 5);
        assert_eq!(report.exported(), 3);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.refs.contains_key("#/pictures/0"));
        assert!(!report.refs.contains_key("#/pictures/1"));
        assert!(report.refs.contains_key("#/pictures/2"));
        assert!(report.refs.contains_key("#/pictures/3"));
        assert_eq!(
            report.warnings[0],
            ExportWarning::MissingImageData {
                self_ref: "#/pictures/1".into()
            }
        );

        let files = std::fs::read_dir(exporter.output_dir()).unwrap().count();
        assert_eq!(files, 3);
    }

    #[test]
    fn urls_point_at_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(dir.path(), "http://h/static/images/sample/");

        let report = exporter.export(&doc_with(&[true])).unwrap();
        let url = &report.refs["#/pictures/0"];
        let filename = url
            .strip_prefix("http://h/static/images/sample/")
            .expect("prefix without double slash");

        assert!(filename.ends_with("_pictures_0.png"), "got {filename}");
        // uuid (36 chars) + '_' + stem
        assert_eq!(filename.len(), 36 + 1 + "pictures_0.png".len());

        let saved = image::open(dir.path().join(filename)).unwrap();
        assert_eq!((saved.width(), saved.height()), (3, 2));
    }

    #[test]
    fn re_export_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(dir.path(), "http://h/i");
        let doc = doc_with(&[true]);

        let first = exporter.export(&doc).unwrap();
        let second = exporter.export(&doc).unwrap();

        assert_ne!(first.refs["#/pictures/0"], second.refs["#/pictures/0"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn document_without_pictures_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(dir.path().join("nested/deeper"), "http://h/i");
        let report = exporter.export(&doc_with(&[])).unwrap();
        assert!(report.refs.is_empty());
        assert!(report.warnings.is_empty());
        assert!(exporter.output_dir().is_dir());
    }

    #[test]
    fn failed_save_is_skipped_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ImageExporter::new(dir.path(), "http://h/i");

        let mut doc = StructuredDocument::new("float");
        // The PNG encoder has no 32-bit float colour type.
        doc.push_picture(Some(1), Some(DynamicImage::ImageRgb32F(Rgb32FImage::new(2, 2))), None);
        doc.push_picture(Some(1), Some(pixel(9)), None);

        let report = exporter.export(&doc).unwrap();

        assert_eq!(report.pictures_seen, 2);
        assert!(!report.refs.contains_key("#/pictures/0"));
        assert!(report.refs.contains_key("#/pictures/1"));
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            ExportWarning::SaveFailed { self_ref, .. } if self_ref == "#/pictures/0"
        ));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1, "only the good picture remains: {files:?}");
        assert!(files[0].ends_with("_pictures_1.png"));
    }

    #[test]
    fn uncreatable_output_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let exporter = ImageExporter::new(blocker.join("sub"), "http://h/i");
        let err = exporter.export(&doc_with(&[true])).unwrap_err();
        assert!(matches!(err, ConvertError::OutputWriteFailed { .. }));
    }
}
