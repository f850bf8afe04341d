pub mod backfill_engine;
pub mod monitor;
pub mod price_store;
pub mod rate_limiter;
pub mod revaluation;
pub mod scheduler;
