//! HTTP API: queue stats, recent results, health, and DB-backed analytics.

pub mod analytics;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::db::DbRouter;
use crate::store::SharedStore;

/// State shared across handlers. The DB router is optional: without a
/// configured primary, the analytics endpoints answer 503.
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    pub db: Option<Arc<DbRouter>>,
}

/// Uniform plain-text error response.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/stats", get(status::stats))
        .route("/results", get(status::results))
        .route("/analytics/summary", get(analytics::summary))
        .route("/analytics/checks", get(analytics::checks))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// Serve the API until shutdown is signaled.
pub async fn serve(
    state: ApiState,
    port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("could not bind port {port}"))?;
    info!(port, "API server listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .context("API server failed")
}
