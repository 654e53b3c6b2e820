//! Server binary for edgequake-pdf2md-server.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServerConfig`, prepares the working directories and runs the HTTP
//! server until Ctrl+C / SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2md_server::{
    server, AppState, ConversionService, ImageRefMode, PdfiumConverter, ServerConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port (5000) with images linked at http://localhost:5000
  pdf2md-server

  # Publish behind a reverse proxy
  pdf2md-server --port 8080 --image-base-url https://docs.example.org

  # Let the serializer write artifact files and reconcile them positionally
  pdf2md-server --image-ref-mode referenced --keep-artifacts

  # Upload from the command line
  curl -F 'files[]=@paper.pdf' http://localhost:5000/convert

ENVIRONMENT VARIABLES:
  PDF2MD_*                Every flag has an env var, see --help
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Overrides -v / -q (e.g. RUST_LOG=tower_http=debug)
"#;

/// Convert uploaded PDFs to Markdown and publish their images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-server",
    version,
    about = "HTTP service converting uploaded PDFs to Markdown with published images",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "PDF2MD_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port.
    #[arg(short, long, env = "PDF2MD_PORT", default_value_t = 5000)]
    port: u16,

    /// Scratch directory for uploaded PDFs.
    #[arg(long, env = "PDF2MD_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory receiving the Markdown files.
    #[arg(long, env = "PDF2MD_OUTPUT_DIR", default_value = "output_md")]
    output_dir: PathBuf,

    /// Directory served under /static.
    #[arg(long, env = "PDF2MD_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Subdirectory of the static directory holding exported images.
    #[arg(long, env = "PDF2MD_IMAGE_SUBDIR", default_value = "images")]
    image_subdir: String,

    /// Public origin written into image URLs.
    #[arg(long, env = "PDF2MD_IMAGE_BASE_URL", default_value = "http://localhost:5000")]
    image_base_url: String,

    /// How pictures are referenced before rewriting.
    #[arg(long, env = "PDF2MD_IMAGE_REF_MODE", value_enum, default_value_t = RefModeArg::SelfRef)]
    image_ref_mode: RefModeArg,

    /// Keep the per-document artifacts directory after rewriting.
    #[arg(long, env = "PDF2MD_KEEP_ARTIFACTS")]
    keep_artifacts: bool,

    /// Maximum request body in MiB.
    #[arg(long, env = "PDF2MD_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDF2MD_PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// User password tried on encrypted PDFs.
    #[arg(long, env = "PDF2MD_PDF_PASSWORD", hide_env_values = true)]
    pdf_password: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RefModeArg {
    SelfRef,
    Referenced,
    Embedded,
    Placeholder,
}

impl From<RefModeArg> for ImageRefMode {
    fn from(v: RefModeArg) -> Self {
        match v {
            RefModeArg::SelfRef => ImageRefMode::SelfRef,
            RefModeArg::Referenced => ImageRefMode::Referenced,
            RefModeArg::Embedded => ImageRefMode::Embedded,
            RefModeArg::Placeholder => ImageRefMode::Placeholder,
        }
    }
}

impl Cli {
    fn to_config(&self) -> Result<ServerConfig> {
        let mut builder = ServerConfig::builder()
            .host(&self.host)
            .port(self.port)
            .upload_dir(&self.upload_dir)
            .output_dir(&self.output_dir)
            .static_dir(&self.static_dir)
            .image_subdir(&self.image_subdir)
            .image_base_url(&self.image_base_url)
            .image_ref_mode(self.image_ref_mode.into())
            .cleanup_artifacts(!self.keep_artifacts)
            .max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024));

        if let Some(ref path) = self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(path);
        }
        if let Some(ref pwd) = self.pdf_password {
            builder = builder.pdf_password(pwd);
        }

        builder.build().context("Invalid server configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Configuration ────────────────────────────────────────────────────
    let config = Arc::new(cli.to_config()?);
    let converter = Arc::new(PdfiumConverter::new(
        config.pdfium_lib_path.clone(),
        config.pdf_password.clone(),
    ));

    let service = ConversionService::new(Arc::clone(&config), converter);
    service
        .prepare_dirs()
        .context("Failed to create working directories")?;

    // ── Serve ────────────────────────────────────────────────────────────
    server::serve(AppState::new(service))
        .await
        .with_context(|| format!("Server on {} failed", config.bind_addr()))?;

    Ok(())
}
