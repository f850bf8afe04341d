use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};

use portfolio_fetcher::errors::FetchError;
use portfolio_fetcher::external::PriceProvider;
use portfolio_fetcher::models::PricePoint;
use portfolio_fetcher::services::rate_limiter::RateLimiter;

/// Scripted provider driven by a fixed sequence of outcomes, exercising the
/// same four-way `FetchError` contract a real HTTP provider would
/// (spec.md §4.2). No network or database involved.
struct StubProvider {
    script: Vec<Result<(), FetchError>>,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(script: Vec<Result<(), FetchError>>) -> Self {
        Self { script, calls: AtomicUsize::new(0) }
    }

    fn point(ticker: &str) -> PricePoint {
        PricePoint {
            asset_id: 0,
            timestamp: Utc::now(),
            open: None,
            high: None,
            low: None,
            close: "100.00".parse::<BigDecimal>().unwrap(),
            volume: None,
            source: format!("stub:{ticker}"),
        }
    }
}

#[async_trait]
impl PriceProvider for StubProvider {
    async fn fetch_range(&self, ticker: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<PricePoint>, FetchError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(idx).cloned().unwrap_or(Ok(())) {
            Ok(()) => Ok(vec![Self::point(ticker)]),
            Err(e) => Err(e),
        }
    }

    async fn fetch_current(&self, ticker: &str) -> Result<PricePoint, FetchError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(idx).cloned().unwrap_or(Ok(())) {
            Ok(()) => Ok(Self::point(ticker)),
            Err(e) => Err(e),
        }
    }
}

#[tokio::test]
async fn throttled_then_success_is_a_recoverable_sequence() {
    let provider = StubProvider::new(vec![Err(FetchError::Throttled), Ok(())]);

    let first = provider.fetch_current("AAPL").await;
    assert_eq!(first.unwrap_err(), FetchError::Throttled);

    let second = provider.fetch_current("AAPL").await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn not_found_never_recovers_on_retry() {
    let provider = StubProvider::new(vec![Err(FetchError::NotFound), Err(FetchError::NotFound)]);
    for _ in 0..2 {
        assert_eq!(provider.fetch_current("DELIST").await.unwrap_err(), FetchError::NotFound);
    }
}

#[tokio::test]
async fn rate_limiter_serializes_acquisitions_from_a_throttled_provider() {
    let provider = Arc::new(StubProvider::new(vec![Err(FetchError::Throttled), Ok(())]));
    let limiter = RateLimiter::new(Duration::from_millis(10), 1_000_000, Duration::from_millis(5));

    limiter.acquire().await;
    let outcome = provider.fetch_current("AAPL").await;
    if outcome.is_err() {
        limiter.report_throttled(1).await;
    }

    limiter.acquire().await;
    let retried = provider.fetch_current("AAPL").await;
    assert!(retried.is_ok());
}
