use sqlx::PgPool;

use crate::models::{Asset, AssetDescriptor};

/// Looks up an asset by ticker, or creates it, returning its identity
/// either way. Tickers are unique case-insensitively per venue, so the
/// lookup and insert both normalize to uppercase.
pub async fn upsert_catalog(pool: &PgPool, descriptor: &AssetDescriptor) -> Result<i64, sqlx::Error> {
    let symbol = descriptor.symbol.trim().to_uppercase();
    let exchange = descriptor.exchange.clone().unwrap_or_else(|| "UNKNOWN".to_string());

    if let Some(existing) = sqlx::query_scalar!(
        "SELECT id FROM assets WHERE UPPER(symbol) = $1 AND exchange = $2",
        symbol,
        exchange
    )
    .fetch_optional(pool)
    .await?
    {
        return Ok(existing);
    }

    let name = descriptor.name.clone().unwrap_or_else(|| symbol.clone());
    let currency = descriptor.native_currency.clone().unwrap_or_else(|| "USD".to_string());

    let id = sqlx::query_scalar!(
        r#"
        INSERT INTO assets (symbol, name, asset_type, exchange, native_currency, is_active)
        VALUES ($1, $2, $3, $4, $5, true)
        ON CONFLICT (symbol, exchange) DO UPDATE SET symbol = EXCLUDED.symbol
        RETURNING id
        "#,
        symbol,
        name,
        descriptor.asset_type as _,
        exchange,
        currency,
    )
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn fetch_by_id(pool: &PgPool, asset_id: i64) -> Result<Option<Asset>, sqlx::Error> {
    sqlx::query_as!(
        Asset,
        r#"
        SELECT id, symbol, name, asset_type as "asset_type: _", exchange, native_currency, is_active
        FROM assets WHERE id = $1
        "#,
        asset_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn fetch_by_symbol(pool: &PgPool, symbol: &str) -> Result<Option<Asset>, sqlx::Error> {
    let symbol = symbol.trim().to_uppercase();
    sqlx::query_as!(
        Asset,
        r#"
        SELECT id, symbol, name, asset_type as "asset_type: _", exchange, native_currency, is_active
        FROM assets WHERE UPPER(symbol) = $1
        "#,
        symbol
    )
    .fetch_optional(pool)
    .await
}
