use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::audit_queries;
use crate::errors::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(status))
}

#[derive(Serialize)]
struct StatusResponse {
    running: bool,
    uptime_seconds: i64,
    assets_tracked: i32,
    last_update: Option<DateTime<Utc>>,
    next_update_countdown: i64,
}

/// GET /api/fetcher/status - derived operational status (spec.md §6):
/// `running` iff the latest `price_update_log` row is newer than
/// `refresh_interval * 1.5`, plus uptime, tracked count, and a countdown
/// to the next scheduled refresh tick.
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let tracked = state.scheduler.price_store().count_tracked().await? as i32;
    let uptime_seconds = state.scheduler.monitor().snapshot(tracked).await.uptime_seconds;

    let last_update = audit_queries::latest_timestamp(&state.pool).await?;
    let refresh_interval = state.scheduler.config().refresh_interval();
    let refresh_secs = refresh_interval.as_secs() as i64;
    let now = Utc::now();

    let (running, next_update_countdown) = match last_update {
        Some(ts) => {
            let elapsed = (now - ts).num_seconds().max(0);
            let running = (elapsed as f64) < (refresh_secs as f64) * 1.5;
            let countdown = refresh_secs - elapsed.rem_euclid(refresh_secs.max(1));
            (running, countdown)
        }
        None => (false, refresh_secs),
    };

    Ok(Json(StatusResponse {
        running,
        uptime_seconds,
        assets_tracked: tracked,
        last_update,
        next_update_countdown,
    }))
}
