use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A timestamped OHLCV record for one asset, keyed by (asset_id, timestamp).
/// `close` is the only field the provider is required to supply; the rest
/// are nullable to tolerate providers that only report a close price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricePoint {
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    pub open: Option<BigDecimal>,
    pub high: Option<BigDecimal>,
    pub low: Option<BigDecimal>,
    pub close: BigDecimal,
    pub volume: Option<i64>,
    pub source: String,
}

impl PricePoint {
    /// Implements the §3 invariant: `low <= {open, close} <= high` when all
    /// four are present, and `close > 0`. Records failing this are dropped
    /// by the Price Source Client before they ever reach the store.
    pub fn is_valid(&self) -> bool {
        if self.close <= BigDecimal::from(0) {
            return false;
        }
        if let (Some(low), Some(high)) = (&self.low, &self.high) {
            if low > high {
                return false;
            }
            if let Some(open) = &self.open {
                if open < low || open > high {
                    return false;
                }
            }
            if &self.close < low || &self.close > high {
                return false;
            }
        }
        true
    }
}
