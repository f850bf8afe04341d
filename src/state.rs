use std::sync::Arc;

use sqlx::PgPool;

use crate::services::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Arc<Scheduler>,
}
