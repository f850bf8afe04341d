use sqlx::PgPool;

use crate::models::PricePoint;

/// Idempotent bulk upsert on the `(asset_id, timestamp)` uniqueness
/// constraint. Returns how many rows were newly persisted versus already
/// present, so callers (the backfill engine, P3) can tell a duplicate run
/// produced no new rows.
pub async fn bulk_insert(pool: &PgPool, asset_id: i64, points: &[PricePoint]) -> Result<(i64, i64), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0i64;
    let mut skipped = 0i64;

    for p in points {
        let result = sqlx::query!(
            r#"
            INSERT INTO asset_prices (asset_id, timestamp, open, high, low, close, volume, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (asset_id, timestamp) DO NOTHING
            "#,
            asset_id,
            p.timestamp,
            p.open,
            p.high,
            p.low,
            p.close,
            p.volume,
            p.source,
        )
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    tx.commit().await?;
    Ok((inserted, skipped))
}

pub async fn fetch_latest(pool: &PgPool, asset_id: i64) -> Result<Option<PricePoint>, sqlx::Error> {
    sqlx::query_as!(
        PricePoint,
        r#"
        SELECT asset_id, timestamp, open, high, low, close, volume, source
        FROM asset_prices
        WHERE asset_id = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
        asset_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn fetch_range(
    pool: &PgPool,
    asset_id: i64,
    from: chrono::NaiveDate,
    to: chrono::NaiveDate,
) -> Result<Vec<PricePoint>, sqlx::Error> {
    let from = from.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let to = to.and_hms_opt(23, 59, 59).unwrap().and_utc();
    sqlx::query_as!(
        PricePoint,
        r#"
        SELECT asset_id, timestamp, open, high, low, close, volume, source
        FROM asset_prices
        WHERE asset_id = $1 AND timestamp BETWEEN $2 AND $3
        ORDER BY timestamp ASC
        "#,
        asset_id,
        from,
        to,
    )
    .fetch_all(pool)
    .await
}

pub async fn count_for_asset(pool: &PgPool, asset_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar!("SELECT COUNT(*) FROM asset_prices WHERE asset_id = $1", asset_id)
        .fetch_one(pool)
        .await
        .map(|c| c.unwrap_or(0))
}
