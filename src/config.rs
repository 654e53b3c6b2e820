//! Configuration for the conversion server.
//!
//! Every path, URL and switch the pipeline reads lives in one immutable
//! [`ServerConfig`], built through [`ServerConfigBuilder`] and shared behind
//! an `Arc`. Nothing in the crate reads process-wide state after startup.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// URL path under which `static_dir` is served.
pub const STATIC_ROUTE: &str = "/static";

/// URL path prefix for Markdown downloads.
pub const DOWNLOAD_ROUTE: &str = "/download_md";

/// Server and pipeline configuration.
///
/// # Example
/// ```rust
/// use edgequake_pdf2md_server::{ImageRefMode, ServerConfig};
///
/// let config = ServerConfig::builder()
///     .port(8080)
///     .image_base_url("https://docs.example.org")
///     .image_ref_mode(ImageRefMode::Referenced)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// TCP port. Default: 5000.
    pub port: u16,

    /// Scratch directory for uploaded PDFs. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory receiving the final Markdown files. Default: `output_md`.
    pub output_dir: PathBuf,

    /// Directory served under `/static`. Default: `static`.
    pub static_dir: PathBuf,

    /// Subdirectory of `static_dir` holding exported images, one folder per
    /// document. Default: `images`.
    pub image_subdir: String,

    /// Public origin prepended to image URLs written into the Markdown.
    /// Default: `http://localhost:5000`.
    ///
    /// Must be reachable by whoever renders the Markdown, which is usually
    /// not the same as the bind address.
    pub image_base_url: String,

    /// How the serializer references pictures before rewriting.
    /// Default: [`ImageRefMode::SelfRef`].
    pub image_ref_mode: ImageRefMode,

    /// Remove the `{basename}_artifacts` directory after rewriting. Default: true.
    pub cleanup_artifacts: bool,

    /// Maximum accepted request body in bytes. Default: 100 MiB.
    pub max_upload_bytes: usize,

    /// Explicit pdfium library path. When None, the current directory and
    /// then the system library path are searched.
    pub pdfium_lib_path: Option<PathBuf>,

    /// User password tried on encrypted PDFs.
    #[serde(skip_serializing)]
    pub pdf_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output_md"),
            static_dir: PathBuf::from("static"),
            image_subdir: "images".to_string(),
            image_base_url: "http://localhost:5000".to_string(),
            image_ref_mode: ImageRefMode::default(),
            cleanup_artifacts: true,
            max_upload_bytes: 100 * 1024 * 1024,
            pdfium_lib_path: None,
            pdf_password: None,
        }
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Root of all exported images (`{static_dir}/{image_subdir}`).
    pub fn image_root(&self) -> PathBuf {
        self.static_dir.join(&self.image_subdir)
    }

    /// Per-document image directory.
    pub fn image_dir(&self, basename: &str) -> PathBuf {
        self.image_root().join(basename)
    }

    /// Absolute URL prefix under which a document's images are reachable.
    pub fn image_url_prefix(&self, basename: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.image_base_url.trim_end_matches('/'),
            STATIC_ROUTE,
            self.image_subdir,
            basename
        )
    }

    /// Final Markdown path for a document.
    pub fn markdown_path(&self, basename: &str) -> PathBuf {
        self.output_dir.join(format!("{basename}.md"))
    }

    /// Transient directory the referenced serializer writes artifacts into.
    ///
    /// Artifact links start with this directory's name and the rewriter reads
    /// the first `image_<digits>` token of a link as the picture ordinal, so
    /// `image_` in the basename is written as `image-` here.
    pub fn artifacts_dir(&self, basename: &str) -> PathBuf {
        let dir_name = basename.replace("image_", "image-");
        self.output_dir.join(format!("{dir_name}_artifacts"))
    }

    /// Relative download URL for a produced Markdown file.
    pub fn download_url(&self, md_filename: &str) -> String {
        format!("{DOWNLOAD_ROUTE}/{md_filename}")
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn upload_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.upload_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn static_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.static_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn image_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.config.image_subdir = subdir.into();
        self
    }

    pub fn image_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.image_base_url = url.into();
        self
    }

    pub fn image_ref_mode(mut self, mode: ImageRefMode) -> Self {
        self.config.image_ref_mode = mode;
        self
    }

    pub fn cleanup_artifacts(mut self, v: bool) -> Self {
        self.config.cleanup_artifacts = v;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.pdfium_lib_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, ConvertError> {
        let c = &self.config;
        if !(c.image_base_url.starts_with("http://") || c.image_base_url.starts_with("https://")) {
            return Err(ConvertError::InvalidConfig(format!(
                "image base URL must start with http:// or https://, got '{}'",
                c.image_base_url
            )));
        }
        if c.port == 0 {
            return Err(ConvertError::InvalidConfig("Port must be ≥ 1".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        let subdir_ok = !c.image_subdir.is_empty()
            && c.image_subdir != "."
            && c.image_subdir != ".."
            && !c.image_subdir.contains(['/', '\\']);
        if !subdir_ok {
            return Err(ConvertError::InvalidConfig(format!(
                "image subdir must be a single path segment, got '{}'",
                c.image_subdir
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How pictures are referenced in the serialized Markdown, before rewriting.
///
/// | Mode | Emitted for a picture | Rewritten? |
/// |------|-----------------------|------------|
/// | `SelfRef` | `![Image](#/pictures/3)` | exact match |
/// | `Referenced` | `![Image](doc_artifacts/image_000003_ab12.png)` | positional fallback |
/// | `Embedded` | `![Image](data:image/png;base64,…)` | never |
/// | `Placeholder` | `<!-- image -->` | nothing to rewrite |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRefMode {
    /// Link each picture by its document self-reference. (default)
    #[default]
    SelfRef,
    /// Write each picture to an artifacts directory and link the file.
    Referenced,
    /// Inline each picture as a base64 PNG data URI.
    Embedded,
    /// Emit an HTML comment instead of an image.
    Placeholder,
}
