pub mod asset_queries;
pub mod audit_queries;
pub mod backfill_queries;
pub mod log_queries;
pub mod price_queries;
pub mod revaluation_queries;
pub mod statistics_queries;
pub mod tracked_asset_queries;
