use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db;
use crate::db::audit_queries::RecentUpdateRow;
use crate::errors::AppError;
use crate::models::{BackfillJob, PricePoint, TrackedAsset};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recent", get(recent_updates))
        .route("/assets/:asset_id/price", get(latest_price))
        .route("/assets/:asset_id/tracking", get(tracking_state))
        .route("/backfill", get(non_terminal_backfill_jobs))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

/// GET /api/fetcher/updates/recent?limit= - most recent refresh/backfill
/// attempts across all tracked assets (spec.md §4.3 audit surface).
async fn recent_updates(State(state): State<AppState>, Query(q): Query<RecentQuery>) -> Result<Json<Vec<RecentUpdateRow>>, AppError> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let rows = db::audit_queries::recent(&state.pool, limit).await?;
    Ok(Json(rows))
}

async fn latest_price(State(state): State<AppState>, Path(asset_id): Path<i64>) -> Result<Json<Option<PricePoint>>, AppError> {
    let point = state.scheduler.price_store().latest_price(asset_id).await?;
    Ok(Json(point))
}

async fn tracking_state(State(state): State<AppState>, Path(asset_id): Path<i64>) -> Result<Json<Option<TrackedAsset>>, AppError> {
    let row = db::tracked_asset_queries::fetch(&state.pool, asset_id).await?;
    Ok(Json(row))
}

/// GET /api/fetcher/updates/backfill - every job not yet completed or
/// failed, for operator visibility into the durable queue (spec.md §4.4).
async fn non_terminal_backfill_jobs(State(state): State<AppState>) -> Result<Json<Vec<BackfillJob>>, AppError> {
    let jobs = db::backfill_queries::fetch_non_terminal(&state.pool).await?;
    Ok(Json(jobs))
}
