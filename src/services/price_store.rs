use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use crate::db;
use crate::errors::AppError;
use crate::models::{AssetDescriptor, PricePoint};

/// Thin, idempotent wrapper over the catalog/price/tracking tables
/// (spec.md §4.3). Every operation here is safe to retry.
pub struct PriceStore {
    pool: PgPool,
}

impl PriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_catalog(&self, descriptor: &AssetDescriptor) -> Result<i64, AppError> {
        db::asset_queries::upsert_catalog(&self.pool, descriptor).await.map_err(|e| {
            error!(symbol = %descriptor.symbol, error = %e, "failed to upsert asset catalog entry");
            AppError::from(e)
        })
    }

    /// Drops invalid records before they ever reach the uniqueness
    /// constraint, then delegates to the conflict-ignoring bulk insert.
    pub async fn bulk_insert(&self, asset_id: i64, points: &[PricePoint]) -> Result<(i64, i64), AppError> {
        let valid: Vec<PricePoint> = points.iter().filter(|p| p.is_valid()).cloned().collect();
        let dropped = points.len() - valid.len();
        if dropped > 0 {
            tracing::info!(asset_id, dropped, "dropped invalid price records before insert");
        }
        db::price_queries::bulk_insert(&self.pool, asset_id, &valid).await.map_err(|e| {
            error!(asset_id, error = %e, "failed to bulk insert price points");
            AppError::from(e)
        })
    }

    pub async fn record_update(
        &self,
        asset_id: i64,
        timestamp: DateTime<Utc>,
        price: Option<BigDecimal>,
        success: bool,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), AppError> {
        db::audit_queries::record_update(&self.pool, asset_id, timestamp, price, success, error, duration_ms)
            .await
            .map_err(|e| {
                error!(asset_id, error = %e, "failed to record update audit row");
                AppError::from(e)
            })
    }

    pub async fn increment_tracking(&self, asset_id: i64) -> Result<i32, AppError> {
        db::tracked_asset_queries::increment_tracking(&self.pool, asset_id)
            .await
            .map_err(AppError::from)
    }

    pub async fn decrement_tracking(&self, asset_id: i64) -> Result<i32, AppError> {
        db::tracked_asset_queries::decrement_tracking(&self.pool, asset_id)
            .await
            .map_err(AppError::from)
    }

    pub async fn list_tracked(&self) -> Result<Vec<i64>, AppError> {
        db::tracked_asset_queries::list_tracked(&self.pool).await.map_err(AppError::from)
    }

    pub async fn count_tracked(&self) -> Result<i64, AppError> {
        db::tracked_asset_queries::count_tracked(&self.pool).await.map_err(AppError::from)
    }

    pub async fn has_price_coverage(&self, asset_id: i64) -> Result<bool, AppError> {
        db::tracked_asset_queries::has_price_coverage(&self.pool, asset_id)
            .await
            .map_err(AppError::from)
    }

    pub async fn mark_refreshed(&self, asset_id: i64) -> Result<(), AppError> {
        db::tracked_asset_queries::mark_refreshed(&self.pool, asset_id)
            .await
            .map_err(AppError::from)
    }

    pub async fn latest_price(&self, asset_id: i64) -> Result<Option<PricePoint>, AppError> {
        db::price_queries::fetch_latest(&self.pool, asset_id).await.map_err(AppError::from)
    }
}
