use sqlx::PgPool;

use crate::models::StatisticsSnapshot;

pub async fn insert(
    pool: &PgPool,
    uptime_seconds: i64,
    total_cycles: i64,
    successful_cycles: i64,
    failed_cycles: i64,
    success_rate: f64,
    average_cycle_duration: f64,
    assets_tracked: i32,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar!(
        r#"
        INSERT INTO fetcher_statistics
            (timestamp, uptime_seconds, total_cycles, successful_cycles, failed_cycles,
             success_rate, average_cycle_duration, assets_tracked)
        VALUES (NOW(), $1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
        uptime_seconds,
        total_cycles,
        successful_cycles,
        failed_cycles,
        success_rate,
        average_cycle_duration,
        assets_tracked,
    )
    .fetch_one(pool)
    .await
}

pub async fn latest(pool: &PgPool) -> Result<Option<StatisticsSnapshot>, sqlx::Error> {
    sqlx::query_as!(
        StatisticsSnapshot,
        r#"
        SELECT id, timestamp, uptime_seconds, total_cycles, successful_cycles, failed_cycles,
               success_rate, average_cycle_duration, assets_tracked
        FROM fetcher_statistics
        ORDER BY timestamp DESC
        LIMIT 1
        "#
    )
    .fetch_optional(pool)
    .await
}
