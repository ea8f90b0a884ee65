//! Query functions for the check archive (`urls` and `checks` tables).
//!
//! Everything goes through the [`DbRouter`]: inserts hit the primary, list
//! and count reads ride the replica when it's healthy. Workers archive each
//! probe outcome here when a primary database is configured.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use url::Url;

use crate::db::router::{DbRouter, RouterError};
use crate::models::UrlResult;

/// One archived check, joined with its URL.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct CheckRow {
    pub id: i32,
    pub url: String,
    pub status: i32,
    pub duration_ms: i64,
    pub worker_id: String,
    pub error_msg: Option<String>,
    pub checked_at: DateTime<Utc>,
}

const CHECK_SELECT: &str = "SELECT c.id, u.url, c.status, c.duration_ms, c.worker_id, \
     c.error_msg, c.checked_at FROM checks c JOIN urls u ON u.id = c.url_id";

/// Insert the URL if it's new and return its id either way.
pub async fn ensure_url(router: &DbRouter, url: &str) -> Result<i32, RouterError> {
    let url = url.to_owned();
    let domain = domain_of(&url);
    router
        .execute(move |db| {
            let url = url.clone();
            let domain = domain.clone();
            async move {
                sqlx::query_scalar::<_, i32>(
                    "INSERT INTO urls (url, domain) VALUES ($1, $2) \
                     ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url RETURNING id",
                )
                .bind(url)
                .bind(domain)
                .fetch_one(&db)
                .await
            }
        })
        .await
}

/// Archive one probe outcome. Returns the new check id.
pub async fn record_check(router: &DbRouter, result: &UrlResult) -> Result<i32, RouterError> {
    let url_id = ensure_url(router, &result.url).await?;
    let result = result.clone();
    router
        .execute(move |db| {
            let result = result.clone();
            async move {
                sqlx::query_scalar::<_, i32>(
                    "INSERT INTO checks (url_id, status, duration_ms, worker_id, error_msg, checked_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                )
                .bind(url_id)
                .bind(i32::from(result.status))
                .bind(result.duration_ms as i64)
                .bind(result.worker_id)
                .bind(if result.error.is_empty() {
                    None
                } else {
                    Some(result.error)
                })
                .bind(result.checked_at)
                .fetch_one(&db)
                .await
            }
        })
        .await
}

/// The most recent checks, newest first.
pub async fn recent_checks(router: &DbRouter, limit: i64) -> Result<Vec<CheckRow>, RouterError> {
    router
        .query(move |db| async move {
            sqlx::query_as::<_, CheckRow>(&format!(
                "{CHECK_SELECT} ORDER BY c.checked_at DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&db)
            .await
        })
        .await
}

pub async fn url_count(router: &DbRouter) -> Result<i64, RouterError> {
    router
        .query_row(|db| async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM urls")
                .fetch_one(&db)
                .await
        })
        .await
}

pub async fn check_count(router: &DbRouter) -> Result<i64, RouterError> {
    router
        .query_row(|db| async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM checks")
                .fetch_one(&db)
                .await
        })
        .await
}

/// Host portion of a URL. Falls back to the raw string when it doesn't
/// parse as a URL at all.
fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}
