use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::models::{BackfillJob, BackfillState};

/// Idempotent enqueue: merges into an existing pending/in-progress/
/// rate-limited job for the same asset instead of creating a duplicate
/// (spec.md §4.4). Completed/failed jobs do not block a fresh enqueue;
/// a later buy of the same asset gets its own job.
pub async fn enqueue(
    pool: &PgPool,
    asset_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    max_attempts: i32,
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar!(
        r#"
        SELECT id FROM backfill_queue
        WHERE asset_id = $1 AND status IN ('pending', 'in_progress', 'rate_limited')
        LIMIT 1
        "#,
        asset_id
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(id) = existing {
        // Merge: widen the window to cover the union, in case a second
        // buy requests an earlier start date than the first.
        sqlx::query!(
            "UPDATE backfill_queue SET start_date = LEAST(start_date, $1), end_date = GREATEST(end_date, $2), updated_at = NOW() WHERE id = $3",
            start_date,
            end_date,
            id
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        return Ok(id);
    }

    let id = sqlx::query_scalar!(
        r#"
        INSERT INTO backfill_queue (asset_id, start_date, end_date, status, attempts, max_attempts)
        VALUES ($1, $2, $3, 'pending', 0, $4)
        RETURNING id
        "#,
        asset_id,
        start_date,
        end_date,
        max_attempts,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}

/// Claims one eligible job (state in pending/rate_limited, with an
/// elapsed or unset `retry_after`, oldest first) via a transactional
/// `UPDATE ... WHERE` so at-most-one-worker semantics hold under any
/// worker count (Design Note "Job queue durability").
pub async fn claim_next(pool: &PgPool) -> Result<Option<BackfillJob>, sqlx::Error> {
    sqlx::query_as!(
        BackfillJob,
        r#"
        UPDATE backfill_queue
        SET status = 'in_progress', updated_at = NOW()
        WHERE id = (
            SELECT id FROM backfill_queue
            WHERE status IN ('pending', 'rate_limited')
              AND (retry_after IS NULL OR retry_after < NOW())
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING id, asset_id, start_date, end_date, status as "status: _", attempts, max_attempts,
                  retry_after, error_message, created_at, updated_at, completed_at
        "#
    )
    .fetch_optional(pool)
    .await
}

pub async fn mark_completed(pool: &PgPool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE backfill_queue SET status = 'completed', completed_at = NOW(), updated_at = NOW() WHERE id = $1",
        job_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, job_id: i64, attempts: i32, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE backfill_queue
        SET status = 'failed', attempts = $2, error_message = $3, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
        job_id,
        attempts,
        error,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_retry(
    pool: &PgPool,
    job_id: i64,
    status: BackfillState,
    attempts: i32,
    retry_after: DateTime<Utc>,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE backfill_queue
        SET status = $2, attempts = $3, retry_after = $4, error_message = $5, updated_at = NOW()
        WHERE id = $1
        "#,
        job_id,
        status as _,
        attempts,
        retry_after,
        error,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Read at startup so the engine can resume non-terminal jobs without
/// trusting any in-memory state (spec.md P7).
pub async fn fetch_non_terminal(pool: &PgPool) -> Result<Vec<BackfillJob>, sqlx::Error> {
    sqlx::query_as!(
        BackfillJob,
        r#"
        SELECT id, asset_id, start_date, end_date, status as "status: _", attempts, max_attempts,
               retry_after, error_message, created_at, updated_at, completed_at
        FROM backfill_queue
        WHERE status IN ('pending', 'in_progress', 'rate_limited')
        ORDER BY created_at ASC
        "#
    )
    .fetch_all(pool)
    .await
}

/// On a cold start, any job left `in_progress` belongs to a process that
/// died mid-attempt. Reset it to `pending` so it is re-eligible for claim
/// rather than stuck forever (spec.md §4.4 "Resumability").
pub async fn requeue_orphaned_in_progress(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query!(
        "UPDATE backfill_queue SET status = 'pending', updated_at = NOW() WHERE status = 'in_progress'"
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
