use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One row per (asset, refresh attempt). Successful rows carry a non-null
/// price; failed rows carry a non-null error message (spec.md P8).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UpdateAudit {
    pub id: i64,
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub price: Option<BigDecimal>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}
