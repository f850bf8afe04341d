use sqlx::PgPool;

use crate::models::TrackedAsset;

pub async fn fetch(pool: &PgPool, asset_id: i64) -> Result<Option<TrackedAsset>, sqlx::Error> {
    sqlx::query_as!(
        TrackedAsset,
        r#"
        SELECT asset_id, tracking_users, first_tracked_at, last_tracked_at, last_price_update
        FROM tracked_assets WHERE asset_id = $1
        "#,
        asset_id
    )
    .fetch_optional(pool)
    .await
}

/// Increments the holder count for an asset, creating the tracking row on
/// first use. Uses `SELECT ... FOR UPDATE` inside a transaction so
/// concurrent increments/decrements on the same asset serialize instead
/// of racing (spec.md §5).
pub async fn increment_tracking(pool: &PgPool, asset_id: i64) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar!(
        "SELECT tracking_users FROM tracked_assets WHERE asset_id = $1 FOR UPDATE",
        asset_id
    )
    .fetch_optional(&mut *tx)
    .await?;

    let new_count = match existing {
        Some(count) => {
            let new_count = count + 1;
            sqlx::query!(
                "UPDATE tracked_assets SET tracking_users = $1, last_tracked_at = NOW() WHERE asset_id = $2",
                new_count,
                asset_id
            )
            .execute(&mut *tx)
            .await?;
            new_count
        }
        None => {
            sqlx::query!(
                r#"
                INSERT INTO tracked_assets (asset_id, tracking_users, first_tracked_at, last_tracked_at)
                VALUES ($1, 1, NOW(), NOW())
                "#,
                asset_id
            )
            .execute(&mut *tx)
            .await?;
            1
        }
    };

    tx.commit().await?;
    Ok(new_count)
}

/// Decrements the holder count, floored at zero (never goes negative,
/// spec.md P4). An asset with a zero count stays in the table and just
/// drops out of `list_tracked`, rather than being deleted, so its
/// first/last-tracked history survives.
pub async fn decrement_tracking(pool: &PgPool, asset_id: i64) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar!(
        "SELECT tracking_users FROM tracked_assets WHERE asset_id = $1 FOR UPDATE",
        asset_id
    )
    .fetch_optional(&mut *tx)
    .await?;

    let new_count = match existing {
        Some(count) => (count - 1).max(0),
        None => 0,
    };

    sqlx::query!(
        "UPDATE tracked_assets SET tracking_users = $1 WHERE asset_id = $2",
        new_count,
        asset_id
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(new_count)
}

pub async fn list_tracked(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar!("SELECT asset_id FROM tracked_assets WHERE tracking_users > 0")
        .fetch_all(pool)
        .await
}

pub async fn count_tracked(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar!("SELECT COUNT(*) FROM tracked_assets WHERE tracking_users > 0")
        .fetch_one(pool)
        .await
        .map(|c| c.unwrap_or(0))
}

pub async fn mark_refreshed(pool: &PgPool, asset_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE tracked_assets SET last_price_update = NOW() WHERE asset_id = $1",
        asset_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// True iff the asset has no price history yet. Used by the Scheduler to
/// decide whether a newly tracked asset needs a backfill job even when
/// its holder count did not just go from 0 to 1 (e.g. a second portfolio
/// buys a ticker another portfolio already sold out of).
pub async fn has_price_coverage(pool: &PgPool, asset_id: i64) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar!("SELECT COUNT(*) FROM asset_prices WHERE asset_id = $1", asset_id)
        .fetch_one(pool)
        .await?
        .unwrap_or(0);
    Ok(count > 0)
}
