use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

pub async fn record_update(
    pool: &PgPool,
    asset_id: i64,
    timestamp: DateTime<Utc>,
    price: Option<BigDecimal>,
    success: bool,
    error_message: Option<&str>,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO price_update_log (asset_id, timestamp, price, success, error_message, duration_ms)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
        asset_id,
        timestamp,
        price,
        success,
        error_message,
        duration_ms,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Row shape for the "recent updates" read-only query, a join against
/// `assets` for symbol/display name (spec.md §6).
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentUpdateRow {
    pub asset_id: i64,
    pub symbol: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub price: Option<BigDecimal>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<RecentUpdateRow>, sqlx::Error> {
    sqlx::query_as!(
        RecentUpdateRow,
        r#"
        SELECT l.asset_id, a.symbol, a.name, l.timestamp, l.price, l.success, l.error_message, l.duration_ms
        FROM price_update_log l
        JOIN assets a ON a.id = l.asset_id
        ORDER BY l.timestamp DESC
        LIMIT $1
        "#,
        limit
    )
    .fetch_all(pool)
    .await
}

pub async fn latest_timestamp(pool: &PgPool) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar!("SELECT MAX(timestamp) FROM price_update_log").fetch_one(pool).await
}
