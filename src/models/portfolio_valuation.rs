use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Cached per-portfolio aggregate the revaluation step writes after every
/// successful refresh cycle. Portfolios and positions themselves are
/// owned externally; this crate only ever writes this one table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PortfolioValuation {
    pub portfolio_id: Uuid,
    pub total_value: BigDecimal,
    pub total_cost: BigDecimal,
    pub profit_loss: BigDecimal,
    pub profit_loss_pct: BigDecimal,
    pub updated_at: DateTime<Utc>,
}
