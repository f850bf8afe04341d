use bigdecimal::{BigDecimal, Zero};
use sqlx::PgPool;
use tracing::{error, warn};

use crate::db;
use crate::errors::AppError;

/// Recomputes and caches each portfolio's aggregate valuation after a
/// successful refresh cycle (spec.md §4.7). Per-portfolio failures are
/// logged and counted but never abort the sweep.
pub struct Revaluation {
    pool: PgPool,
}

impl Revaluation {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn recalculate_all(&self) -> Result<(u32, u32), AppError> {
        let portfolio_ids = db::revaluation_queries::fetch_portfolio_ids(&self.pool)
            .await
            .map_err(AppError::from)?;

        let mut updated = 0u32;
        let mut failed = 0u32;

        for portfolio_id in portfolio_ids {
            match self.recalculate_one(portfolio_id).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    failed += 1;
                    warn!(%portfolio_id, error = %e, "portfolio revaluation failed, continuing sweep");
                }
            }
        }

        Ok((updated, failed))
    }

    async fn recalculate_one(&self, portfolio_id: uuid::Uuid) -> Result<(), AppError> {
        let positions = db::revaluation_queries::fetch_positions_with_prices(&self.pool, portfolio_id)
            .await
            .map_err(AppError::from)?;

        let mut total_value = BigDecimal::zero();
        let mut total_cost = BigDecimal::zero();

        for position in &positions {
            total_cost += &position.quantity * &position.avg_buy_price;
            if let Some(price) = &position.current_price {
                total_value += &position.quantity * price;
            } else {
                // No price history yet for this position's ticker: fall
                // back to cost basis so the portfolio total is never
                // silently understated by a missing quote.
                total_value += &position.quantity * &position.avg_buy_price;
            }
        }

        let profit_loss = &total_value - &total_cost;
        let profit_loss_pct = if total_cost.is_zero() {
            BigDecimal::zero()
        } else {
            (&profit_loss / &total_cost) * BigDecimal::from(100)
        };

        db::revaluation_queries::upsert_valuation(&self.pool, portfolio_id, total_value, total_cost, profit_loss, profit_loss_pct)
            .await
            .map_err(|e| {
                error!(%portfolio_id, error = %e, "failed to persist portfolio valuation");
                AppError::from(e)
            })
    }
}
