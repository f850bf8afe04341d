use axum::{extract::State, routing::get, Json, Router};

use crate::errors::AppError;
use crate::models::StatisticsSnapshot;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/latest", get(latest_snapshot))
}

/// GET /api/fetcher/statistics/latest - most recently persisted snapshot
/// (spec.md §4.5), independent of whether the process that wrote it is
/// still the one answering this request.
async fn latest_snapshot(State(state): State<AppState>) -> Result<Json<Option<StatisticsSnapshot>>, AppError> {
    let snapshot = state.scheduler.monitor().latest_persisted_snapshot().await?;
    Ok(Json(snapshot))
}
