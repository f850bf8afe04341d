use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::FetchError;
use crate::models::PricePoint;

/// Contract for the Price Source Client (spec.md §4.2). One provider
/// request per call; implementations classify failures into the four
/// error kinds the backfill engine and refresh loop branch on.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_range(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, FetchError>;

    async fn fetch_current(&self, ticker: &str) -> Result<PricePoint, FetchError>;
}
