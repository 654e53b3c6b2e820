//! HTTP-level errors and their responses.

use super::routes::ConvertResponse;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors a handler can return. Conversion failures of individual files are
/// not errors at this level; they are reported inside the batch response.
#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected request; the message is returned as JSON.
    #[error("{0}")]
    BadRequest(String),

    /// Resolved path escapes the served directory.
    #[error("Access Denied")]
    Forbidden,

    #[error("File Not Found")]
    NotFound,

    /// The multipart body could not be read (including body-limit overruns).
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ConvertResponse::failure(message)),
            )
                .into_response(),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access Denied").into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, "File Not Found").into_response(),
            AppError::Multipart(e) => {
                tracing::warn!("Failed to read multipart body: {}", e);
                (e.status(), Json(ConvertResponse::failure(e.body_text()))).into_response()
            }
            AppError::Internal(message) => {
                tracing::error!("{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ConvertResponse::failure(message)),
                )
                    .into_response()
            }
        }
    }
}
