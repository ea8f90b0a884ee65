//! Analytics handlers backed by the check archive, read through the
//! primary/replica router.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::db::checks::{self, CheckRow};
use crate::db::{DbRouter, RouterStats};
use crate::web::{ApiError, ApiState};

fn default_checks_limit() -> i64 {
    100
}

#[derive(Deserialize)]
pub struct ChecksParams {
    #[serde(default = "default_checks_limit")]
    pub limit: i64,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub url_count: i64,
    pub check_count: i64,
    pub router: RouterStats,
}

fn require_db(state: &ApiState) -> Result<Arc<DbRouter>, ApiError> {
    state
        .db
        .clone()
        .ok_or_else(|| ApiError::unavailable("analytics disabled: no database configured"))
}

/// Archive row counts plus the router's traffic counters.
pub(super) async fn summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let db = require_db(&state)?;
    let url_count = checks::url_count(&db)
        .await
        .map_err(|e| ApiError::unavailable(format!("url count failed: {e}")))?;
    let check_count = checks::check_count(&db)
        .await
        .map_err(|e| ApiError::unavailable(format!("check count failed: {e}")))?;
    Ok(Json(SummaryResponse {
        url_count,
        check_count,
        router: db.stats(),
    }))
}

/// Recent archived checks, newest first.
pub(super) async fn checks(
    State(state): State<ApiState>,
    Query(params): Query<ChecksParams>,
) -> Result<Json<Vec<CheckRow>>, ApiError> {
    let db = require_db(&state)?;
    let limit = params.limit.clamp(1, 500);
    let rows = checks::recent_checks(&db, limit)
        .await
        .map_err(|e| ApiError::unavailable(format!("checks query failed: {e}")))?;
    Ok(Json(rows))
}
