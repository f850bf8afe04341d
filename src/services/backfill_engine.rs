use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::db;
use crate::errors::{AppError, FetchError};
use crate::external::PriceProvider;
use crate::models::{next_state, AttemptOutcome, BackfillState};
use crate::services::monitor::Monitor;
use crate::services::price_store::PriceStore;
use crate::services::rate_limiter::RateLimiter;

const BASE_BACKOFF_MINUTES: i64 = 5;

/// Durable queue of historical backfill work (spec.md §4.4). Holds no
/// authoritative state of its own; every call reads/writes the
/// `backfill_queue` table directly, so the engine is resumable across
/// restarts by construction.
pub struct BackfillEngine {
    pool: sqlx::PgPool,
    provider: Arc<dyn PriceProvider>,
    rate_limiter: Arc<RateLimiter>,
    price_store: Arc<PriceStore>,
    monitor: Arc<Monitor>,
    max_attempts: i32,
}

impl BackfillEngine {
    pub fn new(
        pool: sqlx::PgPool,
        provider: Arc<dyn PriceProvider>,
        rate_limiter: Arc<RateLimiter>,
        price_store: Arc<PriceStore>,
        monitor: Arc<Monitor>,
        max_attempts: i32,
    ) -> Self {
        Self {
            pool,
            provider,
            rate_limiter,
            price_store,
            monitor,
            max_attempts,
        }
    }

    /// Computes `[trade_date - 365 days, today]` and enqueues a single
    /// job, merging with any existing non-terminal job for the asset
    /// (spec.md §4.4 "Backfill planning", P14).
    pub async fn enqueue_for_purchase(&self, asset_id: i64, trade_date: NaiveDate) -> Result<i64, AppError> {
        let today = Utc::now().date_naive();
        let start = trade_date - chrono::Duration::days(365);
        let end = today.max(trade_date);
        db::backfill_queries::enqueue(&self.pool, asset_id, start, end, self.max_attempts)
            .await
            .map_err(AppError::from)
    }

    /// On startup: any job left `in_progress` belongs to a dead process
    /// and is requeued so it becomes eligible again (spec.md P7).
    pub async fn recover_orphaned_jobs(&self) -> Result<u64, AppError> {
        db::backfill_queries::requeue_orphaned_in_progress(&self.pool).await.map_err(AppError::from)
    }

    /// Drains exactly one eligible job. Returns `true` if a job was
    /// claimed and processed (regardless of outcome), `false` if the
    /// queue had nothing eligible.
    pub async fn run_once(&self) -> Result<bool, AppError> {
        let job = match db::backfill_queries::claim_next(&self.pool).await.map_err(AppError::from)? {
            Some(job) => job,
            None => return Ok(false),
        };

        let asset = db::asset_queries::fetch_by_id(&self.pool, job.asset_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("asset {} not found", job.asset_id)))?;

        self.rate_limiter.acquire().await;

        match self.provider.fetch_range(&asset.symbol, job.start_date, job.end_date).await {
            Ok(points) => {
                let (inserted, skipped) = self.price_store.bulk_insert(job.asset_id, &points).await?;
                db::backfill_queries::mark_completed(&self.pool, job.id).await.map_err(AppError::from)?;
                let _ = self
                    .monitor
                    .write(
                        crate::models::Severity::Info,
                        "backfill job completed",
                        json!({"job_id": job.id, "asset_id": job.asset_id, "inserted": inserted, "skipped": skipped}),
                    )
                    .await;
                Ok(true)
            }
            Err(FetchError::Throttled) => {
                self.rate_limiter.report_throttled(job.attempts.max(1) as u32).await;
                let transition = next_state(
                    AttemptOutcome::Throttled,
                    job.attempts,
                    job.max_attempts,
                    BASE_BACKOFF_MINUTES,
                    chrono::Duration::seconds(5 * (1i64 << job.attempts.clamp(0, 4))),
                );
                let retry_after = Utc::now() + transition.retry_after.unwrap_or_else(|| chrono::Duration::seconds(5));
                db::backfill_queries::mark_retry(
                    &self.pool,
                    job.id,
                    transition.status,
                    transition.attempts,
                    retry_after,
                    Some("throttled by price provider"),
                )
                .await
                .map_err(AppError::from)?;
                let _ = self
                    .monitor
                    .write(
                        crate::models::Severity::Warning,
                        "backfill job throttled",
                        json!({"job_id": job.id, "asset_id": job.asset_id}),
                    )
                    .await;
                Ok(true)
            }
            Err(FetchError::NotFound) => {
                db::backfill_queries::mark_failed(&self.pool, job.id, job.attempts, "ticker not found at provider")
                    .await
                    .map_err(AppError::from)?;
                let _ = self
                    .monitor
                    .write(
                        crate::models::Severity::Warning,
                        "backfill job failed: ticker not found",
                        json!({"job_id": job.id, "asset_id": job.asset_id, "symbol": asset.symbol}),
                    )
                    .await;
                Ok(true)
            }
            Err(e @ (FetchError::Transient(_) | FetchError::BadData(_))) => {
                let transition = next_state(AttemptOutcome::Transient, job.attempts, job.max_attempts, BASE_BACKOFF_MINUTES, chrono::Duration::zero());
                if transition.terminal {
                    db::backfill_queries::mark_failed(&self.pool, job.id, transition.attempts, &e.to_string())
                        .await
                        .map_err(AppError::from)?;
                    let _ = self
                        .monitor
                        .write(
                            crate::models::Severity::Warning,
                            "backfill job failed: retry budget exhausted",
                            json!({"job_id": job.id, "asset_id": job.asset_id, "error": e.to_string()}),
                        )
                        .await;
                } else {
                    let retry_after = Utc::now() + transition.retry_after.unwrap();
                    db::backfill_queries::mark_retry(
                        &self.pool,
                        job.id,
                        BackfillState::Pending,
                        transition.attempts,
                        retry_after,
                        Some(&e.to_string()),
                    )
                    .await
                    .map_err(AppError::from)?;
                    let _ = self
                        .monitor
                        .write(
                            crate::models::Severity::Warning,
                            "backfill job scheduled for retry",
                            json!({"job_id": job.id, "asset_id": job.asset_id, "attempts": transition.attempts, "error": e.to_string()}),
                        )
                        .await;
                }
                Ok(true)
            }
        }
    }

    /// Runs `run_once` in a tight loop until the queue reports nothing
    /// eligible, used both at startup (draining jobs discovered on a cold
    /// start) and by the background worker loop between ticks.
    pub async fn drain(&self) -> Result<u64, AppError> {
        let mut processed = 0u64;
        while self.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }
}
