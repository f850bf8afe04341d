use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{LogEntry, Severity};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_logs))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    severity: Option<String>,
}

#[derive(Serialize)]
struct LogsResponse {
    entries: Vec<LogEntry>,
    total: i64,
}

fn parse_severity(raw: &str) -> Result<Severity, AppError> {
    match raw.to_lowercase().as_str() {
        "debug" => Ok(Severity::Debug),
        "info" => Ok(Severity::Info),
        "warning" | "warn" => Ok(Severity::Warning),
        "error" => Ok(Severity::Error),
        "critical" => Ok(Severity::Critical),
        other => Err(AppError::Validation(format!("unknown log severity '{other}'"))),
    }
}

/// GET /api/fetcher/logs?limit=&offset=&severity= - paginated, newest-first
/// (spec.md §4.5 external query surface).
async fn list_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Result<Json<LogsResponse>, AppError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    let offset = q.offset.unwrap_or(0).max(0);
    let severity = q.severity.as_deref().map(parse_severity).transpose()?;

    let (entries, total) = state.scheduler.monitor().read(limit, offset, severity).await?;
    Ok(Json(LogsResponse { entries, total }))
}
