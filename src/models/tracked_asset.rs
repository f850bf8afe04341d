use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Reference-counted membership in the refresh set. An asset is refreshed
/// by the Scheduler iff `tracking_users > 0`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrackedAsset {
    pub asset_id: i64,
    pub tracking_users: i32,
    pub first_tracked_at: DateTime<Utc>,
    pub last_tracked_at: DateTime<Utc>,
    pub last_price_update: Option<DateTime<Utc>>,
}
