use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::db;
use crate::errors::AppError;
use crate::models::{LogEntry, Severity, StatisticsSnapshot};

const ROLLING_WINDOW: usize = 100;

/// In-memory state backing `begin_cycle`/`end_cycle`/`snapshot`
/// (spec.md §4.5). Process-scoped and reset on restart; the database,
/// not this struct, is the canonical record (Design Notes "Global
/// state").
struct Counters {
    process_start: Instant,
    total_cycles: i64,
    successful_cycles: i64,
    failed_cycles: i64,
    durations: VecDeque<f64>,
}

impl Counters {
    fn new() -> Self {
        Self {
            process_start: Instant::now(),
            total_cycles: 0,
            successful_cycles: 0,
            failed_cycles: 0,
            durations: VecDeque::with_capacity(ROLLING_WINDOW),
        }
    }
}

/// Append-only structured log store plus rolling-window cycle statistics.
/// The single mutex around `Counters` is only ever held for the duration
/// of an arithmetic update; `snapshot()` takes a short copy so readers
/// never block on writers (spec.md §5).
pub struct Monitor {
    pool: PgPool,
    counters: Mutex<Counters>,
}

pub struct CycleHandle {
    started_at: Instant,
}

impl Monitor {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self {
            pool,
            counters: Mutex::new(Counters::new()),
        })
    }

    pub async fn write(&self, level: Severity, message: &str, context: JsonValue) -> Result<(), AppError> {
        match level {
            Severity::Debug => tracing::debug!(%message, %context),
            Severity::Info => tracing::info!(%message, %context),
            Severity::Warning => tracing::warn!(%message, %context),
            Severity::Error => tracing::error!(%message, %context),
            Severity::Critical => tracing::error!(%message, %context, critical = true),
        }
        db::log_queries::write(&self.pool, level, message, context).await.map_err(|e| {
            tracing::error!(error = %e, "failed to persist log entry");
            AppError::from(e)
        })?;
        Ok(())
    }

    pub async fn info(&self, message: &str) -> Result<(), AppError> {
        self.write(Severity::Info, message, json!({})).await
    }

    pub async fn warn(&self, message: &str) -> Result<(), AppError> {
        self.write(Severity::Warning, message, json!({})).await
    }

    pub async fn read(
        &self,
        limit: i64,
        offset: i64,
        severity: Option<Severity>,
    ) -> Result<(Vec<LogEntry>, i64), AppError> {
        db::log_queries::read(&self.pool, limit, offset, severity).await.map_err(AppError::from)
    }

    pub async fn purge_older_than(&self, days: i64) -> Result<u64, AppError> {
        db::log_queries::purge_older_than(&self.pool, days).await.map_err(AppError::from)
    }

    pub fn begin_cycle(&self) -> CycleHandle {
        CycleHandle { started_at: Instant::now() }
    }

    pub fn end_cycle(&self, handle: CycleHandle, success: bool) -> f64 {
        let duration = handle.started_at.elapsed().as_secs_f64();
        let mut counters = self.counters.lock();
        counters.total_cycles += 1;
        if success {
            counters.successful_cycles += 1;
        } else {
            counters.failed_cycles += 1;
        }
        if counters.durations.len() == ROLLING_WINDOW {
            counters.durations.pop_front();
        }
        counters.durations.push_back(duration);
        duration
    }

    /// Computes the aggregate view per the exact formulas in spec.md P9/P10.
    pub async fn snapshot(&self, assets_tracked: i32) -> StatisticsSnapshotView {
        let (uptime_seconds, total, successful, failed, avg_duration) = {
            let counters = self.counters.lock();
            let success_rate = if counters.total_cycles > 0 {
                round2(counters.successful_cycles as f64 / counters.total_cycles as f64 * 100.0)
            } else {
                0.0
            };
            let avg = if counters.durations.is_empty() {
                0.0
            } else {
                round2(counters.durations.iter().sum::<f64>() / counters.durations.len() as f64)
            };
            (
                counters.process_start.elapsed().as_secs() as i64,
                counters.total_cycles,
                counters.successful_cycles,
                counters.failed_cycles,
                (success_rate, avg),
            )
        };
        let (success_rate, average_cycle_duration) = avg_duration;
        StatisticsSnapshotView {
            uptime_seconds,
            total_cycles: total,
            successful_cycles: successful,
            failed_cycles: failed,
            success_rate,
            average_cycle_duration,
            assets_tracked,
        }
    }

    pub async fn persist_snapshot(&self, view: &StatisticsSnapshotView) -> Result<(), AppError> {
        db::statistics_queries::insert(
            &self.pool,
            view.uptime_seconds,
            view.total_cycles,
            view.successful_cycles,
            view.failed_cycles,
            view.success_rate,
            view.average_cycle_duration,
            view.assets_tracked,
        )
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    pub async fn latest_persisted_snapshot(&self) -> Result<Option<StatisticsSnapshot>, AppError> {
        db::statistics_queries::latest(&self.pool).await.map_err(AppError::from)
    }
}

#[derive(Debug, Clone)]
pub struct StatisticsSnapshotView {
    pub uptime_seconds: i64,
    pub total_cycles: i64,
    pub successful_cycles: i64,
    pub failed_cycles: i64,
    pub success_rate: f64,
    pub average_cycle_duration: f64,
    pub assets_tracked: i32,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_matches_formula() {
        // Can't construct a Monitor without a pool in a unit test; the
        // formula itself is exercised directly here the way the monitor
        // computes it internally.
        let successful = 7.0;
        let total = 9.0;
        let rate = round2(successful / total * 100.0);
        assert_eq!(rate, 77.78);
    }

    #[test]
    fn rolling_mean_uses_only_the_last_100_durations() {
        let mut window: VecDeque<f64> = VecDeque::new();
        for i in 0..150 {
            if window.len() == ROLLING_WINDOW {
                window.pop_front();
            }
            window.push_back(i as f64);
        }
        assert_eq!(window.len(), 100);
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        // Values 50..=149 remain; mean of that range is 99.5.
        assert_eq!(mean, 99.5);
    }

    #[test]
    fn zero_cycles_yields_zero_success_rate() {
        let total = 0.0f64;
        let rate = if total > 0.0 { 100.0 } else { 0.0 };
        assert_eq!(rate, 0.0);
    }
}
