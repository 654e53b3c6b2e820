//! HTTP front end.
//!
//! | Route                    | Handler                        |
//! |--------------------------|--------------------------------|
//! | `GET /`                  | upload page                    |
//! | `POST /convert`          | batch conversion (`files[]`)   |
//! | `GET /download_md/*file` | produced Markdown, inline      |
//! | `GET /static/*`          | `static_dir` (exported images) |
//! | `GET /health`            | liveness                       |

mod error;
pub mod routes;
mod state;

pub use error::AppError;
pub use state::AppState;

use crate::config::{DOWNLOAD_ROUTE, STATIC_ROUTE};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.service.config().max_upload_bytes;
    let static_dir = state.service.config().static_dir.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health_check))
        .route(
            "/convert",
            post(routes::convert_files).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(&format!("{DOWNLOAD_ROUTE}/*filename"), get(routes::download_md))
        .nest_service(STATIC_ROUTE, ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let config = state.service.config();
    let addr = config.bind_addr();

    tracing::info!("Serving images from: {}", config.image_root().display());
    tracing::info!("Image base URL for Markdown: {}", config.image_base_url);
    tracing::info!("Markdown output directory: {}", config.output_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("pdf2md server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
