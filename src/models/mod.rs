mod asset;
mod backfill_job;
mod log_entry;
mod portfolio_valuation;
mod price_point;
mod statistics_snapshot;
mod tracked_asset;
mod update_audit;

pub use asset::{Asset, AssetDescriptor, InstrumentClass};
pub use backfill_job::{is_eligible, next_state, AttemptOutcome, BackfillJob, BackfillState, Transition};
pub use log_entry::{LogEntry, Severity};
pub use portfolio_valuation::PortfolioValuation;
pub use price_point::PricePoint;
pub use statistics_snapshot::StatisticsSnapshot;
pub use tracked_asset::TrackedAsset;
pub use update_audit::UpdateAudit;
