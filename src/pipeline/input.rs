//! Input handling: validate an uploaded file and stage it on disk.
//!
//! ## Why a scratch file?
//!
//! pdfium requires a file-system path: it cannot stream from a byte buffer.
//! The upload is written to a [`NamedTempFile`] inside `upload_dir`, which
//! gives every request its own path even when two clients upload the same
//! filename at once. The handle is closed explicitly once the pipeline is
//! done so removal failures can be logged; if the pipeline panics the drop
//! still removes the file. We validate the PDF magic bytes (`%PDF`) before
//! handing the path to the converter so callers get a meaningful error
//! rather than a pdfium crash.

use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use unicode_normalization::UnicodeNormalization;
use tracing::{debug, info, warn};

/// Extensions accepted for conversion (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// True when `filename` has an extension in [`ALLOWED_EXTENSIONS`].
///
/// The extension is whatever follows the last `.`; a name without a dot is
/// rejected.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// The name is NFKD-normalised and stripped of non-ASCII characters, so
/// accented letters keep their base letter. Path separators become spaces,
/// runs of whitespace become a single `_`,
/// everything outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing
/// `.` and `_` are stripped. The result never contains a path separator and
/// is never `.` or `..`; it may be empty.
///
/// ```rust
/// use edgequake_pdf2md_server::pipeline::input::secure_filename;
///
/// assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
/// assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
/// ```
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    RE_UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Split a sanitised filename into its stem (everything before the last `.`).
pub fn file_stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// A validated upload: original name, sanitised name and basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    /// Name as sent by the client.
    pub original: String,
    /// Output of [`secure_filename`].
    pub secure: String,
    /// `secure` without its extension; keys every derived path.
    pub basename: String,
}

impl UploadName {
    /// Validate the extension and sanitise the name.
    pub fn parse(original: &str) -> Result<Self, ConvertError> {
        let secure = secure_filename(original);
        if !allowed_file(original) {
            return Err(ConvertError::UnsupportedFileType { filename: secure });
        }
        let basename = file_stem(&secure).to_string();
        if basename.is_empty() {
            return Err(ConvertError::InvalidFilename {
                filename: original.to_string(),
            });
        }
        Ok(Self {
            original: original.to_string(),
            secure,
            basename,
        })
    }
}

/// Write the uploaded bytes to a uniquely named scratch file in `upload_dir`.
pub fn stage_upload(
    upload_dir: &Path,
    name: &UploadName,
    bytes: &[u8],
) -> Result<NamedTempFile, ConvertError> {
    std::fs::create_dir_all(upload_dir).map_err(|e| ConvertError::UploadWriteFailed {
        path: upload_dir.to_path_buf(),
        source: e,
    })?;

    let mut scratch = tempfile::Builder::new()
        .prefix(&format!("{}-", name.basename))
        .suffix(".pdf")
        .tempfile_in(upload_dir)
        .map_err(|e| ConvertError::UploadWriteFailed {
            path: upload_dir.join(&name.secure),
            source: e,
        })?;

    scratch
        .write_all(bytes)
        .and_then(|_| scratch.flush())
        .map_err(|e| ConvertError::UploadWriteFailed {
            path: scratch.path().to_path_buf(),
            source: e,
        })?;

    info!(
        "Stored upload '{}' ({} bytes) at {}",
        name.original,
        bytes.len(),
        scratch.path().display()
    );
    Ok(scratch)
}

/// Check the first four bytes of `path` are `%PDF`.
pub fn verify_pdf_magic(path: &Path) -> Result<(), ConvertError> {
    let mut file = std::fs::File::open(path).map_err(|e| ConvertError::UploadWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == b"%PDF" => {
            debug!("PDF magic ok: {}", path.display());
            Ok(())
        }
        Ok(()) => Err(ConvertError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        }),
        // Shorter than four bytes: whatever is there, it is not a PDF.
        Err(_) => Err(ConvertError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        }),
    }
}

/// Remove a scratch upload, logging instead of failing.
pub fn discard_upload(scratch: NamedTempFile) {
    let path = scratch.path().to_path_buf();
    match scratch.close() {
        Ok(()) => info!("Removed uploaded file: {}", path.display()),
        Err(e) => warn!("Could not remove uploaded file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("paper.pdf"));
        assert!(allowed_file("PAPER.PDF"));
        assert!(allowed_file("a.b.Pdf"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("pdf"));
        assert!(!allowed_file(""));
        assert!(!allowed_file("archive.pdf.zip"));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(secure_filename("_pictures_3"), "pictures_3");
        assert_eq!(secure_filename("résumé 2024.pdf"), "resume_2024.pdf");
        assert_eq!(secure_filename("ﬁle.pdf"), "file.pdf");
        assert_eq!(secure_filename("a;b|c.pdf"), "abc.pdf");
        assert_eq!(secure_filename(".."), "");
        assert_eq!(secure_filename("///"), "");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("report.pdf"), "report");
        assert_eq!(file_stem("a.b.pdf"), "a.b");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn upload_name_rejects_wrong_extension() {
        let err = UploadName::parse("notes.txt").unwrap_err();
        assert_eq!(err.to_string(), "File type not allowed for notes.txt");
    }

    #[test]
    fn upload_name_keeps_base_letters_of_accented_names() {
        let n = UploadName::parse("ü.pdf").unwrap();
        assert_eq!(n.secure, "u.pdf");
        assert_eq!(n.basename, "u");
    }

    #[test]
    fn upload_name_of_bare_extension() {
        let n = UploadName::parse(".pdf").unwrap();
        assert_eq!(n.secure, "pdf");
        assert_eq!(n.basename, "pdf");

        let n = UploadName::parse("日本.pdf").unwrap();
        assert_eq!(n.basename, "pdf");
    }

    #[test]
    fn upload_name_parses_basename() {
        let n = UploadName::parse("../My Report.PDF").unwrap();
        assert_eq!(n.secure, "My_Report.PDF");
        assert_eq!(n.basename, "My_Report");
    }

    #[test]
    fn stage_and_discard_upload() {
        let dir = tempfile::tempdir().unwrap();
        let name = UploadName::parse("doc.pdf").unwrap();
        let scratch = stage_upload(dir.path(), &name, b"%PDF-1.7\n").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("doc-"));
        verify_pdf_magic(&path).unwrap();

        discard_upload(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn magic_check_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let name = UploadName::parse("fake.pdf").unwrap();
        let scratch = stage_upload(dir.path(), &name, b"PK\x03\x04zip").unwrap();
        let err = verify_pdf_magic(scratch.path()).unwrap_err();
        assert!(matches!(err, ConvertError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[test]
    fn magic_check_rejects_tiny_file() {
        let dir = tempfile::tempdir().unwrap();
        let name = UploadName::parse("tiny.pdf").unwrap();
        let scratch = stage_upload(dir.path(), &name, b"%P").unwrap();
        assert!(verify_pdf_magic(scratch.path()).is_err());
    }
}
