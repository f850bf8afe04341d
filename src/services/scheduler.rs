use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::FetcherConfig;
use crate::db;
use crate::errors::AppError;
use crate::external::PriceProvider;
use crate::models::Severity;
use crate::services::backfill_engine::BackfillEngine;
use crate::services::monitor::Monitor;
use crate::services::price_store::PriceStore;
use crate::services::rate_limiter::RateLimiter;
use crate::services::revaluation::Revaluation;

/// Payload of the `transaction_created` Postgres NOTIFY channel
/// (spec.md §6). The listener is idempotent: replaying the same
/// notification only ever re-reads current `tracked_assets` state, it
/// never trusts an in-memory count.
#[derive(Debug, Deserialize)]
pub struct TransactionCreatedEvent {
    #[allow(dead_code)]
    pub transaction_id: i64,
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// Owns the process lifecycle: startup, the notification listener, the
/// refresh loop, the statistics-snapshot loop, the log-retention sweep,
/// and the backfill worker pool (spec.md §4.6).
pub struct Scheduler {
    pool: PgPool,
    config: FetcherConfig,
    price_store: Arc<PriceStore>,
    backfill_engine: Arc<BackfillEngine>,
    monitor: Arc<Monitor>,
    revaluation: Arc<Revaluation>,
    provider: Arc<dyn PriceProvider>,
    rate_limiter: Arc<RateLimiter>,
}

/// Policy resolution for "what counts as a successful cycle" (Design
/// Notes / SPEC_FULL.md OQ): at least one asset updated without error.
/// Chosen because it keeps the daemon reporting healthy cycles during
/// partial provider outages.
const CYCLE_SUCCESS_POLICY: &str = "at_least_one";

impl Scheduler {
    pub fn new(pool: PgPool, config: FetcherConfig, provider: Arc<dyn PriceProvider>) -> Self {
        let monitor = Monitor::new(pool.clone());
        let price_store = Arc::new(PriceStore::new(pool.clone()));
        let rate_limiter = Arc::new(RateLimiter::from_config(config.price_source_min_interval_ms, config.price_source_hourly_cap));
        let backfill_engine = Arc::new(BackfillEngine::new(
            pool.clone(),
            provider.clone(),
            rate_limiter.clone(),
            price_store.clone(),
            monitor.clone(),
            config.backfill_max_attempts,
        ));
        let revaluation = Arc::new(Revaluation::new(pool.clone()));

        Self {
            pool,
            config,
            price_store,
            backfill_engine,
            monitor,
            revaluation,
            provider,
            rate_limiter,
        }
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    pub fn price_store(&self) -> Arc<PriceStore> {
        self.price_store.clone()
    }

    pub fn backfill_engine(&self) -> Arc<BackfillEngine> {
        self.backfill_engine.clone()
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Startup sequence per spec.md §4.6: record start, write the initial
    /// snapshot, requeue orphaned jobs and drain anything eligible.
    async fn startup(&self) -> Result<(), AppError> {
        let requeued = self.backfill_engine.recover_orphaned_jobs().await?;
        if requeued > 0 {
            info!(requeued, "requeued orphaned in-progress backfill jobs from a prior run");
        }

        let tracked = self.price_store.count_tracked().await.unwrap_or(0) as i32;
        let snapshot = self.monitor.snapshot(tracked).await;
        self.monitor.persist_snapshot(&snapshot).await?;

        self.monitor
            .write(Severity::Info, "fetcher scheduler starting", json!({"cycle_success_policy": CYCLE_SUCCESS_POLICY}))
            .await?;

        let drained = self.backfill_engine.drain().await?;
        if drained > 0 {
            info!(drained, "drained backfill jobs discovered at startup");
        }

        Ok(())
    }

    /// Runs until `shutdown_rx` reports true, then completes any
    /// in-flight cycle, writes a final snapshot, and returns.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), AppError> {
        self.startup().await?;

        let mut handles = Vec::new();

        handles.push(tokio::spawn(self.clone().notification_listener_loop(shutdown_rx.clone())));
        handles.push(tokio::spawn(self.clone().refresh_loop(shutdown_rx.clone())));
        handles.push(tokio::spawn(self.clone().snapshot_loop(shutdown_rx.clone())));
        handles.push(tokio::spawn(self.clone().retention_loop(shutdown_rx.clone())));
        for _ in 0..self.config.backfill_worker_count {
            handles.push(tokio::spawn(self.clone().backfill_worker_loop(shutdown_rx.clone())));
        }

        shutdown_rx.changed().await.ok();
        info!("shutdown signal received, waiting for in-flight work to complete");

        let grace = self.config.shutdown_grace();
        let join_all = futures::future::join_all(handles);
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("shutdown grace period elapsed before all tasks finished");
        }

        let tracked = self.price_store.count_tracked().await.unwrap_or(0) as i32;
        let snapshot = self.monitor.snapshot(tracked).await;
        let _ = self.monitor.persist_snapshot(&snapshot).await;
        let _ = self.monitor.info("fetcher scheduler stopped").await;

        Ok(())
    }

    async fn notification_listener_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            match self.listen_once(&mut shutdown_rx).await {
                Ok(stop) if stop => return,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "transaction_created listener failed, retrying in 1s");
                    sleep(Duration::from_secs(1)).await;
                }
            }
            if *shutdown_rx.borrow() {
                return;
            }
        }
    }

    async fn listen_once(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Result<bool, AppError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| AppError::External(format!("failed to start transaction_created listener: {e}")))?;
        listener
            .listen("transaction_created")
            .await
            .map_err(|e| AppError::External(format!("failed to LISTEN transaction_created: {e}")))?;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return Ok(true),
                notification = listener.recv() => {
                    match notification {
                        Ok(note) => {
                            if let Err(e) = self.handle_notification(note.payload()).await {
                                error!(error = %e, "failed to handle transaction_created notification");
                            }
                        }
                        Err(e) => return Err(AppError::External(e.to_string())),
                    }
                }
            }
        }
    }

    /// Handler for one `transaction_created` event (spec.md §4.6). The
    /// increment always happens; the backfill enqueue only happens when
    /// this is the asset's first holder, or when it has no price history
    /// yet (SPEC_FULL.md covers a second-buy-after-sellout edge case).
    async fn handle_notification(&self, payload: &str) -> Result<(), AppError> {
        let event: TransactionCreatedEvent =
            serde_json::from_str(payload).map_err(|e| AppError::Validation(format!("malformed transaction_created payload: {e}")))?;

        let new_count = self.price_store.increment_tracking(event.asset_id).await?;
        let has_coverage = self.price_store.has_price_coverage(event.asset_id).await?;

        if new_count == 1 || !has_coverage {
            let job_id = self
                .backfill_engine
                .enqueue_for_purchase(event.asset_id, event.timestamp.date_naive())
                .await?;
            self.monitor
                .write(
                    Severity::Info,
                    "enqueued backfill job for newly tracked asset",
                    json!({"asset_id": event.asset_id, "job_id": job_id, "tracking_users": new_count}),
                )
                .await?;
        }

        Ok(())
    }

    async fn backfill_worker_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                processed = self.backfill_engine.run_once() => {
                    match processed {
                        Ok(true) => continue,
                        Ok(false) => {
                            // Nothing eligible right now; avoid busy-looping.
                            tokio::select! {
                                _ = shutdown_rx.changed() => return,
                                _ = sleep(Duration::from_secs(5)) => {}
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "backfill worker iteration failed");
                            sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn refresh_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_refresh_cycle().await {
                        error!(error = %e, "refresh cycle failed unexpectedly");
                    }
                }
            }
        }
    }

    /// One full refresh cycle (spec.md §4.6 steps 1-7). No per-asset error
    /// escapes this function; the loop boundary above also catches any
    /// `Err` so a single bad cycle never kills the daemon.
    async fn run_refresh_cycle(&self) -> Result<(), AppError> {
        let cycle = self.monitor.begin_cycle();
        let _ = self.monitor.info("refresh cycle starting").await;

        let tracked = self.price_store.list_tracked().await?;
        let mut updated = 0usize;
        let mut errored = 0usize;

        for asset_id in tracked {
            let asset = match db::asset_queries::fetch_by_id(&self.pool, asset_id).await {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    errored += 1;
                    warn!(asset_id, error = %e, "could not load asset for refresh");
                    continue;
                }
            };

            let started = std::time::Instant::now();
            self.rate_limiter.acquire().await;

            match self.provider.fetch_current(&asset.symbol).await {
                Ok(point) => {
                    if let Err(e) = self.price_store.bulk_insert(asset_id, std::slice::from_ref(&point)).await {
                        warn!(asset_id, error = %e, "failed to persist fetched price point");
                    }
                    if let Err(e) = self
                        .price_store
                        .record_update(asset_id, point.timestamp, Some(point.close.clone()), true, None, started.elapsed().as_millis() as i64)
                        .await
                    {
                        warn!(asset_id, error = %e, "failed to record update audit row");
                    }
                    let _ = self.price_store.mark_refreshed(asset_id).await;
                    updated += 1;
                }
                Err(crate::errors::FetchError::Throttled) => {
                    self.rate_limiter.report_throttled(1).await;
                    let _ = self
                        .price_store
                        .record_update(asset_id, Utc::now(), None, false, Some("throttled by provider"), started.elapsed().as_millis() as i64)
                        .await;
                    errored += 1;
                }
                Err(e) => {
                    let _ = self
                        .price_store
                        .record_update(asset_id, Utc::now(), None, false, Some(&e.to_string()), started.elapsed().as_millis() as i64)
                        .await;
                    errored += 1;
                }
            }
        }

        let success = updated > 0 || (updated == 0 && errored == 0);
        let duration = self.monitor.end_cycle(cycle, success);

        if let Err(e) = self
            .monitor
            .write(
                Severity::Info,
                "refresh cycle complete",
                json!({
                    "updated": updated,
                    "errored": errored,
                    "duration_seconds": duration,
                    "success": success,
                    "cycle_success_policy": CYCLE_SUCCESS_POLICY,
                }),
            )
            .await
        {
            error!(error = %e, "failed to persist refresh-cycle-complete log entry");
        }

        if success {
            match self.revaluation.recalculate_all().await {
                Ok((ok, failed)) => {
                    let _ = self
                        .monitor
                        .write(Severity::Info, "portfolio revaluation complete", json!({"updated": ok, "failed": failed}))
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "portfolio revaluation sweep failed");
                }
            }
        }

        let tracked_count = self.price_store.count_tracked().await.unwrap_or(0) as i32;
        let snapshot = self.monitor.snapshot(tracked_count).await;
        if let Err(e) = self.monitor.persist_snapshot(&snapshot).await {
            error!(error = %e, "failed to persist statistics snapshot");
        }

        Ok(())
    }

    async fn snapshot_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.stats_persist_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = ticker.tick() => {
                    let tracked = self.price_store.count_tracked().await.unwrap_or(0) as i32;
                    let snapshot = self.monitor.snapshot(tracked).await;
                    if let Err(e) = self.monitor.persist_snapshot(&snapshot).await {
                        error!(error = %e, "periodic statistics snapshot failed");
                    }
                }
            }
        }
    }

    /// Daily log-retention sweep, run via `tokio_cron_scheduler` rather than
    /// a fixed interval. This is the one calendar-shaped job in the daemon
    /// (spec.md §4.6), as opposed to the refresh/snapshot loops' sub-hour
    /// cadence.
    async fn retention_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut sched = match JobScheduler::new().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to start log retention scheduler");
                return;
            }
        };

        let this = self.clone();
        let job = match Job::new_async("0 0 0 * * *", move |_uuid, _lock| {
            let this = this.clone();
            Box::pin(async move {
                match this.monitor.purge_older_than(this.config.log_retention_days).await {
                    Ok(deleted) => info!(deleted, "log retention sweep complete"),
                    Err(e) => error!(error = %e, "log retention sweep failed"),
                }
            })
        }) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to build log retention job");
                return;
            }
        };

        if let Err(e) = sched.add(job).await {
            error!(error = %e, "failed to register log retention job");
            return;
        }
        if let Err(e) = sched.start().await {
            error!(error = %e, "failed to start log retention job scheduler");
            return;
        }

        shutdown_rx.changed().await.ok();
        let _ = sched.shutdown().await;
    }
}
