//! Queue status handlers.

use axum::extract::State;
use axum::response::Json;
use tracing::trace;

use crate::models::{QueueStats, UrlResult};
use crate::web::{ApiError, ApiState};

/// How many recent results `GET /results` returns.
const RESULTS_WINDOW: isize = 100;

/// Liveness of the shared store: plain "OK" or a 503.
pub(super) async fn health(State(state): State<ApiState>) -> Result<&'static str, ApiError> {
    trace!("health check requested");
    state
        .store
        .ping()
        .await
        .map_err(|e| ApiError::unavailable(format!("shared store unavailable: {e}")))?;
    Ok("OK")
}

/// Fleet counters. `total` folds in everything still queued or in flight.
pub(super) async fn stats(State(state): State<ApiState>) -> Result<Json<QueueStats>, ApiError> {
    let stats = state
        .store
        .queue_stats()
        .await
        .map_err(|e| ApiError::unavailable(format!("stats unavailable: {e}")))?;
    Ok(Json(stats))
}

/// The most recent check results, newest first.
pub(super) async fn results(
    State(state): State<ApiState>,
) -> Result<Json<Vec<UrlResult>>, ApiError> {
    let results = state
        .store
        .recent_results(RESULTS_WINDOW)
        .await
        .map_err(|e| ApiError::unavailable(format!("results unavailable: {e}")))?;
    Ok(Json(results))
}
