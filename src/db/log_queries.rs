use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::models::{LogEntry, Severity};

pub async fn write(pool: &PgPool, level: Severity, message: &str, context: JsonValue) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar!(
        r#"
        INSERT INTO fetcher_logs (timestamp, level, message, context)
        VALUES (NOW(), $1, $2, $3)
        RETURNING id
        "#,
        level as _,
        message,
        context,
    )
    .fetch_one(pool)
    .await
}

/// Paginated, newest-first read with an optional severity filter
/// (spec.md §4.5 / external query surface).
pub async fn read(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    severity_filter: Option<Severity>,
) -> Result<(Vec<LogEntry>, i64), sqlx::Error> {
    let entries = match severity_filter {
        Some(level) => {
            sqlx::query_as!(
                LogEntry,
                r#"
                SELECT id, timestamp, level as "level: _", message, context
                FROM fetcher_logs
                WHERE level = $1
                ORDER BY timestamp DESC
                LIMIT $2 OFFSET $3
                "#,
                level as _,
                limit,
                offset,
            )
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as!(
                LogEntry,
                r#"
                SELECT id, timestamp, level as "level: _", message, context
                FROM fetcher_logs
                ORDER BY timestamp DESC
                LIMIT $1 OFFSET $2
                "#,
                limit,
                offset,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let total = match severity_filter {
        Some(level) => {
            sqlx::query_scalar!("SELECT COUNT(*) FROM fetcher_logs WHERE level = $1", level as _)
                .fetch_one(pool)
                .await?
        }
        None => sqlx::query_scalar!("SELECT COUNT(*) FROM fetcher_logs").fetch_one(pool).await?,
    }
    .unwrap_or(0);

    Ok((entries, total))
}

/// Deletes every log entry older than `days`, for the daily retention
/// sweep (spec.md P11).
pub async fn purge_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query!(
        "DELETE FROM fetcher_logs WHERE timestamp < NOW() - ($1 || ' days')::interval",
        days.to_string()
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
