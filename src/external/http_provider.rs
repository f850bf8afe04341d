use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::FetchError;
use crate::external::price_provider::PriceProvider;
use crate::models::PricePoint;

/// HTTP-backed provider for a daily time-series OHLCV endpoint. Configured
/// generically (base URL + API key + User-Agent) rather than against one
/// named vendor, since spec.md explicitly excludes "authoring a new price
/// data source" and treats the provider as a pluggable external
/// collaborator (§1 Non-goals).
pub struct HttpPriceProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    source_tag: String,
}

impl HttpPriceProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, source_tag: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("portfolio-fetcher/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            source_tag: source_tag.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    values: Vec<TimeSeriesValue>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesValue {
    datetime: String,
    #[serde(default)]
    open: Option<String>,
    #[serde(default)]
    high: Option<String>,
    #[serde(default)]
    low: Option<String>,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

fn classify_http_status(status: reqwest::StatusCode) -> Option<FetchError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Some(FetchError::Throttled);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Some(FetchError::NotFound);
    }
    if status.is_server_error() {
        return Some(FetchError::Transient(format!("provider returned {status}")));
    }
    None
}

fn parse_value(ticker: &str, v: &TimeSeriesValue, source: &str) -> Option<PricePoint> {
    let date_part = v.datetime.split(' ').next().unwrap_or(&v.datetime);
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let timestamp = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    let close: BigDecimal = v.close.parse().ok()?;
    let point = PricePoint {
        asset_id: 0,
        timestamp,
        open: v.open.as_ref().and_then(|s| s.parse().ok()),
        high: v.high.as_ref().and_then(|s| s.parse().ok()),
        low: v.low.as_ref().and_then(|s| s.parse().ok()),
        close,
        volume: v.volume.as_ref().and_then(|s| s.parse().ok()),
        source: source.to_string(),
    };
    if point.is_valid() {
        Some(point)
    } else {
        warn!(ticker, date = %date, "dropping invalid price record from provider");
        None
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn fetch_range(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<PricePoint>, FetchError> {
        let outputsize = ((to - from).num_days().max(1) + 1).min(5000);
        let resp = self
            .client
            .get(format!("{}/time_series", self.base_url))
            .query(&[
                ("symbol", ticker),
                ("interval", "1day"),
                ("outputsize", &outputsize.to_string()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        if let Some(status_err) = classify_http_status(resp.status()) {
            return Err(status_err);
        }

        let body: TimeSeriesResponse = resp.json().await.map_err(|e| FetchError::BadData(e.to_string()))?;

        if body.status != "ok" {
            let msg = body.message.unwrap_or_else(|| "unknown provider error".to_string());
            if msg.to_lowercase().contains("rate limit") || msg.to_lowercase().contains("credits") {
                return Err(FetchError::Throttled);
            }
            return Err(FetchError::Transient(msg));
        }

        if body.values.is_empty() {
            return Err(FetchError::BadData("provider returned an empty time series".into()));
        }

        let points: Vec<PricePoint> = body
            .values
            .iter()
            .filter_map(|v| parse_value(ticker, v, &self.source_tag))
            .filter(|p| {
                let d = p.timestamp.date_naive();
                d >= from && d <= to
            })
            .collect();

        if points.is_empty() {
            return Err(FetchError::BadData("no usable records after validation".into()));
        }

        Ok(points)
    }

    async fn fetch_current(&self, ticker: &str) -> Result<PricePoint, FetchError> {
        // Request a week-wide window rather than just today: on a weekend or
        // market holiday the provider's most recent close is dated earlier,
        // and a single-day window would filter it out as out-of-range.
        let today = Utc::now().date_naive();
        let from = today - Duration::days(7);
        let points = self.fetch_range(ticker, from, today).await?;
        points
            .into_iter()
            .max_by_key(|p| p.timestamp)
            .ok_or_else(|| FetchError::BadData("no current price returned".into()))
    }
}
