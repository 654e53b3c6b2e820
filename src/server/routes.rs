//! Request handlers.

use super::error::AppError;
use super::state::AppState;
use crate::convert::{BatchOutcome, ConvertedFile, Upload};
use crate::pipeline::input::secure_filename;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

/// Multipart field carrying the PDFs.
pub const FILES_FIELD: &str = "files[]";

/// JSON body of `POST /convert` (and of JSON error responses).
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ConvertedFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConvertResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            files: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: env!("CARGO_PKG_NAME"),
    })
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.index_html().to_string())
}

/// `POST /convert`: convert every PDF in the `files[]` field.
pub async fn convert_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, AppError> {
    let mut uploads = Vec::new();
    let mut saw_field = false;

    while let Some(field) = multipart.next_field().await? {
        // Parts without a filename are form values, not files.
        if field.name() != Some(FILES_FIELD) || field.file_name().is_none() {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        saw_field = true;
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        debug!("Received '{}' ({} bytes)", filename, bytes.len());
        uploads.push(Upload::new(filename, bytes.to_vec()));
    }

    if !saw_field {
        return Err(AppError::BadRequest("No file part in the request.".into()));
    }
    if uploads.first().map_or(true, |u| u.filename.is_empty()) {
        return Err(AppError::BadRequest("No files selected for upload.".into()));
    }

    info!("Converting {} uploaded file(s)", uploads.len());
    let outcome = state.service.convert_batch(uploads).await;
    batch_response(outcome)
}

/// Map a batch outcome onto the response policy.
fn batch_response(outcome: BatchOutcome) -> Result<Json<ConvertResponse>, AppError> {
    match (outcome.files.is_empty(), outcome.errors.is_empty()) {
        (false, true) => Ok(Json(ConvertResponse {
            success: true,
            files: Some(outcome.files),
            message: None,
        })),
        (false, false) => {
            let message = format!("Partial success. Errors: {}", outcome.error_message());
            Ok(Json(ConvertResponse {
                success: true,
                files: Some(outcome.files),
                message: Some(message),
            }))
        }
        (true, false) => Err(AppError::BadRequest(outcome.error_message())),
        (true, true) => Err(AppError::BadRequest(
            "No valid PDF files found to convert.".into(),
        )),
    }
}

/// `GET /download_md/*filename`: serve a produced Markdown file inline.
pub async fn download_md(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let safe = secure_filename(&filename);
    if safe.is_empty() {
        return Err(AppError::NotFound);
    }

    let output_dir = &state.service.config().output_dir;
    let root = tokio::fs::canonicalize(output_dir)
        .await
        .map_err(|_| AppError::NotFound)?;

    let resolved = match tokio::fs::canonicalize(output_dir.join(&safe)).await {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => return Err(AppError::Internal(format!("Cannot resolve '{safe}': {e}"))),
    };

    if !resolved.starts_with(&root) {
        warn!("Refusing download of '{}': resolves outside output directory", safe);
        return Err(AppError::Forbidden);
    }

    let body = match tokio::fs::read(&resolved).await {
        Ok(b) => b,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            return Err(AppError::NotFound)
        }
        Err(e) => return Err(AppError::Internal(format!("Cannot read '{safe}': {e}"))),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        body,
    )
        .into_response())
}
