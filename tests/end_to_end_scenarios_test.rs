use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use sqlx::PgPool;

use portfolio_fetcher::errors::FetchError;
use portfolio_fetcher::external::PriceProvider;
use portfolio_fetcher::models::{AssetDescriptor, PricePoint};
use portfolio_fetcher::services::backfill_engine::BackfillEngine;
use portfolio_fetcher::services::monitor::Monitor;
use portfolio_fetcher::services::price_store::PriceStore;
use portfolio_fetcher::services::rate_limiter::RateLimiter;

/// Per-ticker scripted outcomes for `fetch_range`/`fetch_current`, one
/// consumed per call; the script's last entry repeats once exhausted.
/// Exercises the backfill/refresh machinery end to end without a network
/// dependency, seeded via `#[sqlx::test]`'s throwaway database.
struct MapProvider {
    scripts: HashMap<String, Vec<Result<(), FetchError>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MapProvider {
    fn new(scripts: HashMap<String, Vec<Result<(), FetchError>>>) -> Self {
        Self { scripts, calls: Mutex::new(HashMap::new()) }
    }

    fn next_outcome(&self, ticker: &str) -> Result<(), FetchError> {
        let mut calls = self.calls.lock().unwrap();
        let idx = *calls.get(ticker).unwrap_or(&0);
        calls.insert(ticker.to_string(), idx + 1);
        let script = self.scripts.get(ticker).cloned().unwrap_or_default();
        script.get(idx).cloned().unwrap_or_else(|| script.last().cloned().unwrap_or(Ok(())))
    }

    fn point(ticker: &str, date: NaiveDate) -> PricePoint {
        PricePoint {
            asset_id: 0,
            timestamp: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()),
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
impl PriceProvider for MapProvider {
    async fn fetch_range(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<PricePoint>, FetchError> {
        self.next_outcome(ticker)?;
        let days = (to - from).num_days().max(0);
        Ok((0..=days).map(|d| Self::point(ticker, from + ChronoDuration::days(d))).collect())
    }

    async fn fetch_current(&self, ticker: &str) -> Result<PricePoint, FetchError> {
        self.next_outcome(ticker)?;
        Ok(Self::point(ticker, Utc::now().date_naive()))
    }
}

async fn seed_asset(price_store: &PriceStore, symbol: &str) -> i64 {
    price_store.upsert_catalog(&AssetDescriptor::from_symbol(symbol)).await.unwrap()
}

fn no_wait_rate_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(Duration::from_millis(0), 1_000_000, Duration::from_millis(0)))
}

/// Scenario 1: fresh backfill for a newly tracked asset reaches
/// `completed` with a year of history and a tracking count of 1.
#[sqlx::test]
async fn fresh_backfill_reaches_completed_with_full_history(pool: PgPool) {
    let price_store = Arc::new(PriceStore::new(pool.clone()));
    let monitor = Monitor::new(pool.clone());
    let asset_id = seed_asset(&price_store, "AAPL").await;
    price_store.increment_tracking(asset_id).await.unwrap();

    let mut scripts = HashMap::new();
    scripts.insert("AAPL".to_string(), vec![Ok(())]);
    let provider: Arc<dyn PriceProvider> = Arc::new(MapProvider::new(scripts));

    let engine = BackfillEngine::new(pool.clone(), provider, no_wait_rate_limiter(), price_store.clone(), monitor, 5);

    let trade_date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    let job_id = engine.enqueue_for_purchase(asset_id, trade_date).await.unwrap();

    while engine.run_once().await.unwrap() {}

    let job = sqlx::query!(
        r#"SELECT status::text as "status!: String", start_date, end_date FROM backfill_queue WHERE id = $1"#,
        job_id
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(job.status, "completed");
    assert_eq!(job.start_date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());

    let row_count: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM asset_prices WHERE asset_id = $1", asset_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .unwrap_or(0);
    assert!(row_count >= 200, "expected at least 200 rows, got {row_count}");

    assert_eq!(price_store.count_tracked().await.unwrap(), 1);
}

/// Scenario 2: a throttled first attempt recovers on retry once the
/// backoff window passes, ending at `completed`.
#[sqlx::test]
async fn throttled_backfill_recovers_on_retry(pool: PgPool) {
    let price_store = Arc::new(PriceStore::new(pool.clone()));
    let monitor = Monitor::new(pool.clone());
    let asset_id = seed_asset(&price_store, "MSFT").await;

    let mut scripts = HashMap::new();
    scripts.insert("MSFT".to_string(), vec![Err(FetchError::Throttled), Ok(())]);
    let provider: Arc<dyn PriceProvider> = Arc::new(MapProvider::new(scripts));
    let engine = BackfillEngine::new(pool.clone(), provider, no_wait_rate_limiter(), price_store.clone(), monitor, 5);

    let job_id = engine.enqueue_for_purchase(asset_id, Utc::now().date_naive()).await.unwrap();

    assert!(engine.run_once().await.unwrap());
    let status = sqlx::query_scalar!(r#"SELECT status::text as "status!: String" FROM backfill_queue WHERE id = $1"#, job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "rate_limited");

    // Fast-forward past the throttle backoff instead of sleeping for it.
    sqlx::query!("UPDATE backfill_queue SET retry_after = NOW() - interval '1 second' WHERE id = $1", job_id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(engine.run_once().await.unwrap());
    let status = sqlx::query_scalar!(r#"SELECT status::text as "status!: String" FROM backfill_queue WHERE id = $1"#, job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "completed");

    let row_count: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM asset_prices WHERE asset_id = $1", asset_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .unwrap_or(0);
    assert!(row_count > 0);
}

/// Scenario 3: transient failures on every attempt exhaust the retry
/// budget and land the job in `failed` with the error recorded.
#[sqlx::test]
async fn permanent_failure_exhausts_retry_budget(pool: PgPool) {
    let price_store = Arc::new(PriceStore::new(pool.clone()));
    let monitor = Monitor::new(pool.clone());
    let asset_id = seed_asset(&price_store, "ZNGA").await;

    let max_attempts = 5;
    let mut scripts = HashMap::new();
    scripts.insert("ZNGA".to_string(), vec![Err(FetchError::Transient("provider unreachable".into())); max_attempts as usize]);
    let provider: Arc<dyn PriceProvider> = Arc::new(MapProvider::new(scripts));
    let engine = BackfillEngine::new(pool.clone(), provider, no_wait_rate_limiter(), price_store.clone(), monitor, max_attempts);

    let job_id = engine.enqueue_for_purchase(asset_id, Utc::now().date_naive()).await.unwrap();

    for _ in 0..max_attempts {
        engine.run_once().await.unwrap();
        sqlx::query!("UPDATE backfill_queue SET retry_after = NOW() - interval '1 second' WHERE id = $1", job_id)
            .execute(&pool)
            .await
            .unwrap();
    }

    let row = sqlx::query!(
        r#"SELECT status::text as "status!: String", attempts, error_message FROM backfill_queue WHERE id = $1"#,
        job_id
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.attempts, max_attempts);
    assert!(row.error_message.is_some());
}

/// Scenario 4: a refresh pass over three tracked assets where one errors
/// (`NotFound`) still updates the other two and records all three
/// attempts in the audit log.
#[sqlx::test]
async fn refresh_with_mixed_outcomes_isolates_the_failing_asset(pool: PgPool) {
    let price_store = Arc::new(PriceStore::new(pool.clone()));

    let asset_a = seed_asset(&price_store, "A").await;
    let asset_b = seed_asset(&price_store, "B").await;
    let asset_c = seed_asset(&price_store, "C").await;
    for id in [asset_a, asset_b, asset_c] {
        price_store.increment_tracking(id).await.unwrap();
    }

    let mut scripts = HashMap::new();
    scripts.insert("A".to_string(), vec![Ok(())]);
    scripts.insert("B".to_string(), vec![Err(FetchError::NotFound)]);
    scripts.insert("C".to_string(), vec![Ok(())]);
    let provider = MapProvider::new(scripts);

    for (id, ticker) in [(asset_a, "A"), (asset_b, "B"), (asset_c, "C")] {
        match provider.fetch_current(ticker).await {
            Ok(point) => {
                price_store.bulk_insert(id, std::slice::from_ref(&point)).await.unwrap();
                price_store.record_update(id, point.timestamp, Some(point.close.clone()), true, None, 10).await.unwrap();
            }
            Err(e) => {
                price_store.record_update(id, Utc::now(), None, false, Some(&e.to_string()), 10).await.unwrap();
            }
        }
    }

    let total: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM price_update_log").fetch_one(&pool).await.unwrap().unwrap_or(0);
    assert_eq!(total, 3);

    let successes: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM price_update_log WHERE success = true")
        .fetch_one(&pool)
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(successes, 2);

    assert!(price_store.latest_price(asset_a).await.unwrap().is_some());
    assert!(price_store.latest_price(asset_c).await.unwrap().is_some());
    assert!(price_store.latest_price(asset_b).await.unwrap().is_none());
}

/// Scenario 5: two buys followed by one sell leave the holder count at 1
/// (never negative), and the asset stays in the refresh set.
#[sqlx::test]
async fn reference_counting_tracks_buy_sell_sequence(pool: PgPool) {
    let price_store = PriceStore::new(pool.clone());
    let asset_id = seed_asset(&price_store, "GOOG").await;

    assert_eq!(price_store.increment_tracking(asset_id).await.unwrap(), 1);
    assert_eq!(price_store.increment_tracking(asset_id).await.unwrap(), 2);
    assert_eq!(price_store.decrement_tracking(asset_id).await.unwrap(), 1);

    let tracked = price_store.list_tracked().await.unwrap();
    assert!(tracked.contains(&asset_id));
}

/// Scenario 6: a retention sweep over a thousand seeded log entries
/// spanning 60 days drops exactly the ones older than the horizon.
#[sqlx::test]
async fn retention_purge_drops_entries_older_than_the_horizon(pool: PgPool) {
    let monitor = Monitor::new(pool.clone());

    // Kept clear of the 30-day boundary (0-28 vs 31-59) so purge's NOW()
    // vs the seed's NOW() never lands a row on the wrong side.
    for i in 0..500i64 {
        let days_ago = i % 29;
        seed_log(&pool, days_ago).await;
    }
    for i in 0..500i64 {
        let days_ago = 31 + (i % 29);
        seed_log(&pool, days_ago).await;
    }

    let deleted = monitor.purge_older_than(30).await.unwrap();
    assert_eq!(deleted, 500);

    let remaining: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM fetcher_logs").fetch_one(&pool).await.unwrap().unwrap_or(0);
    assert_eq!(remaining, 500);
}

async fn seed_log(pool: &PgPool, days_ago: i64) {
    sqlx::query!(
        r#"
        INSERT INTO fetcher_logs (timestamp, level, message, context)
        VALUES (NOW() - ($1 || ' days')::interval, 'info', 'seed', '{}'::jsonb)
        "#,
        days_ago.to_string()
    )
    .execute(pool)
    .await
    .unwrap();
}
