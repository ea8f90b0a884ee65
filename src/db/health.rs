//! Database liveness probe.

use sqlx::PgPool;

/// Verify the connection is alive with the cheapest possible round trip.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}
