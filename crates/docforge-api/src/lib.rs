// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge-api — HTTP surface of the Docforge job engine.
//
//   GET    /health
//   POST   /documents            raw PDF bytes -> documentId
//   GET    /documents/:id        current bytes
//   POST   /jobs                 {kind, documentId, settings} -> jobId
//   GET    /jobs                 recent jobs, newest first
//   GET    /jobs/:id             state, result or error
//   DELETE /jobs/:id             request cancellation
//   GET    /jobs/:id/audit       audit entries (redact and repair jobs)

pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the router over `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.engine.config().max_document_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/documents", post(handlers::upload_document))
        .route("/documents/:id", get(handlers::download_document))
        .route("/jobs", get(handlers::list_jobs).post(handlers::submit_job))
        .route("/jobs/:id", get(handlers::get_job).delete(handlers::cancel_job))
        .route("/jobs/:id/audit", get(handlers::job_audit))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
