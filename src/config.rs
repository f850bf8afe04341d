use std::time::Duration;

/// Recognized configuration (spec.md §6), loaded from the environment the
/// same way the teacher's `LoggingConfig::from_env` does.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub database_url: String,
    pub update_interval_minutes: u64,
    pub log_retention_days: i64,
    pub stats_persist_interval_seconds: u64,
    pub price_source_min_interval_ms: u64,
    pub price_source_hourly_cap: usize,
    pub backfill_max_attempts: i32,
    pub backfill_worker_count: usize,
    pub shutdown_grace_seconds: u64,
    pub price_provider_base_url: String,
    pub price_provider_api_key: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl FetcherConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is required".to_string())?;

        let update_interval_minutes: u64 = env_or("UPDATE_INTERVAL_MINUTES", 10).max(1);

        Ok(Self {
            database_url,
            update_interval_minutes,
            log_retention_days: env_or("LOG_RETENTION_DAYS", 30),
            stats_persist_interval_seconds: env_or("STATS_PERSIST_INTERVAL_SECONDS", 300),
            price_source_min_interval_ms: env_or("PRICE_SOURCE_MIN_INTERVAL_MS", 1000),
            price_source_hourly_cap: env_or("PRICE_SOURCE_HOURLY_CAP", 1800),
            backfill_max_attempts: env_or("BACKFILL_MAX_ATTEMPTS", 5),
            backfill_worker_count: env_or::<usize>("BACKFILL_WORKER_COUNT", 1).clamp(1, 4),
            shutdown_grace_seconds: env_or("SHUTDOWN_GRACE_SECONDS", 30),
            price_provider_base_url: std::env::var("PRICE_PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.example-prices.invalid".to_string()),
            price_provider_api_key: std::env::var("PRICE_PROVIDER_API_KEY").unwrap_or_default(),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }

    pub fn stats_persist_interval(&self) -> Duration {
        Duration::from_secs(self.stats_persist_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_interval_floors_at_one_minute() {
        std::env::set_var("UPDATE_INTERVAL_MINUTES", "0");
        let v: u64 = env_or("UPDATE_INTERVAL_MINUTES", 10);
        assert_eq!(v.max(1), 1);
        std::env::remove_var("UPDATE_INTERVAL_MINUTES");
    }
}
