use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn fetch_portfolio_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar!("SELECT id FROM portfolios").fetch_all(pool).await
}

/// One row per position, joined against the most recent close price for
/// its ticker. `current_price` is null when the asset has no price
/// history yet; the revaluation step skips those positions but still
/// counts the portfolio as processed.
pub struct PositionValuation {
    pub quantity: BigDecimal,
    pub avg_buy_price: BigDecimal,
    pub current_price: Option<BigDecimal>,
}

pub async fn fetch_positions_with_prices(pool: &PgPool, portfolio_id: Uuid) -> Result<Vec<PositionValuation>, sqlx::Error> {
    sqlx::query_as!(
        PositionValuation,
        r#"
        SELECT
            p.shares::numeric AS "quantity!",
            p.avg_buy_price::numeric AS "avg_buy_price!",
            (
                SELECT close FROM asset_prices ap
                JOIN assets a ON a.id = ap.asset_id
                WHERE UPPER(a.symbol) = UPPER(p.ticker)
                ORDER BY ap.timestamp DESC
                LIMIT 1
            ) AS current_price
        FROM positions p
        WHERE p.portfolio_id = $1
        "#,
        portfolio_id
    )
    .fetch_all(pool)
    .await
}

pub async fn upsert_valuation(
    pool: &PgPool,
    portfolio_id: Uuid,
    total_value: BigDecimal,
    total_cost: BigDecimal,
    profit_loss: BigDecimal,
    profit_loss_pct: BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO portfolio_performance_cache (portfolio_id, total_value, total_cost, profit_loss, profit_loss_pct, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (portfolio_id) DO UPDATE SET
            total_value = EXCLUDED.total_value,
            total_cost = EXCLUDED.total_cost,
            profit_loss = EXCLUDED.profit_loss,
            profit_loss_pct = EXCLUDED.profit_loss_pct,
            updated_at = NOW()
        "#,
        portfolio_id,
        total_value,
        total_cost,
        profit_loss,
        profit_loss_pct,
    )
    .execute(pool)
    .await?;
    Ok(())
}
