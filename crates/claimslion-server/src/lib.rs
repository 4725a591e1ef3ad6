//! HTTP surface for ClaimsLion: upload, job status, results and chat.

pub mod error;
pub mod handlers;
pub mod logging;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use handlers::{chat, jobs};
pub use state::AppState;

/// Headroom above the upload ceiling for multipart framing, so that the
/// intake check decides oversize files rather than the body limit.
const MULTIPART_SLACK: usize = 64 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(state.lifecycle.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_SLACK);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/api/upload", post(jobs::handle_upload))
        .route(
            "/api/jobs",
            get(jobs::handle_list_jobs).delete(jobs::handle_delete_all),
        )
        .route(
            "/api/jobs/{id}",
            get(jobs::handle_get_job).delete(jobs::handle_delete_job),
        )
        .route("/api/jobs/{id}/status", get(jobs::handle_job_status))
        .route("/api/jobs/{id}/wait", get(jobs::handle_wait))
        .route("/api/jobs/{id}/retry", post(jobs::handle_retry))
        .route("/api/jobs/{id}/rows", get(jobs::handle_rows))
        .route("/api/jobs/{id}/summary", get(jobs::handle_summary))
        .route(
            "/api/chat/{id}",
            post(chat::handle_ask).get(chat::handle_history),
        )
        .fallback(handlers::handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then cancels in-flight waits.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = state.shutdown.clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            token.cancel();
        })
        .await
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    log::info!("Shutdown signal received");
}
