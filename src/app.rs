use axum::Router;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::routes::{health, logs, statistics, status, updates};
use crate::state::AppState;

/// Read-only query surface for the fetcher (spec.md §4.5/§4.3/§4.4). This
/// subsystem never exposes a write API of its own; the only inbound
/// triggers are the `transaction_created` notification and its own
/// schedulers.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.as_bytes().starts_with(b"http://localhost:") || origin.as_bytes().starts_with(b"http://127.0.0.1:")
        }))
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/fetcher/status", status::router())
        .nest("/api/fetcher/statistics", statistics::router())
        .nest("/api/fetcher/logs", logs::router())
        .nest("/api/fetcher/updates", updates::router())
        .with_state(state)
        .layer(cors)
}
