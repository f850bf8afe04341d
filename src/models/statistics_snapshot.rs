use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A point-in-time view of the monitor's aggregate counters. Snapshots
/// accumulate in `fetcher_statistics`; the most recent row answers a
/// statistics query (spec.md §4.5).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatisticsSnapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub total_cycles: i64,
    pub successful_cycles: i64,
    pub failed_cycles: i64,
    pub success_rate: f64,
    pub average_cycle_duration: f64,
    pub assets_tracked: i32,
}
