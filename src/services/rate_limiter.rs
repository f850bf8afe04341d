use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Rate limiter shared by every outbound price request, whether driven by
/// the backfill engine or the refresh loop (spec.md §4.1). Enforces two
/// invariants: a minimum gap between successive requests, and a cap on
/// requests completed within any sliding 60-minute window.
pub struct RateLimiter {
    min_interval: Duration,
    hourly_cap: usize,
    last_request: Mutex<Instant>,
    /// Timestamps of completed acquisitions within the trailing hour,
    /// oldest first, used to enforce `hourly_cap` as a sliding window.
    window: Mutex<VecDeque<Instant>>,
    base_backoff: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, hourly_cap: usize, base_backoff: Duration) -> Self {
        Self {
            min_interval,
            hourly_cap,
            last_request: Mutex::new(Instant::now() - min_interval),
            window: Mutex::new(VecDeque::new()),
            base_backoff,
        }
    }

    pub fn from_config(min_interval_ms: u64, hourly_cap: usize) -> Self {
        Self::new(Duration::from_millis(min_interval_ms), hourly_cap, Duration::from_secs(5))
    }

    /// Blocks until both the minimum-interval and hourly-cap invariants
    /// are satisfied, then records the request.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let last = *self.last_request.lock();
                let elapsed = last.elapsed();
                if elapsed < self.min_interval {
                    Some(self.min_interval - elapsed)
                } else {
                    None
                }
            };
            if let Some(delay) = wait {
                sleep(delay).await;
                continue;
            }

            let hourly_wait = {
                let mut window = self.window.lock();
                prune_window(&mut window);
                if window.len() >= self.hourly_cap {
                    // Wait until the oldest entry ages out of the window.
                    window.front().map(|oldest| {
                        let age = oldest.elapsed();
                        Duration::from_secs(3600).saturating_sub(age)
                    })
                } else {
                    None
                }
            };
            if let Some(delay) = hourly_wait {
                if delay.is_zero() {
                    continue;
                }
                sleep(delay).await;
                continue;
            }

            *self.last_request.lock() = Instant::now();
            self.window.lock().push_back(Instant::now());
            return;
        }
    }

    /// Sleeps for `base * 2^(attempt-1)`, capped at five steps (5, 10, 20,
    /// 40, 80 seconds with the default 5s base), called when the provider
    /// signals a throttle response.
    pub async fn report_throttled(&self, attempt: u32) {
        let attempt = attempt.clamp(1, 5);
        let factor = 1u64 << (attempt - 1);
        sleep(self.base_backoff * factor as u32).await;
    }

    /// Fraction of the hourly cap consumed by requests still inside the
    /// sliding window, for diagnostic logging.
    pub fn current_utilization(&self) -> f64 {
        let mut window = self.window.lock();
        prune_window(&mut window);
        if self.hourly_cap == 0 {
            return 0.0;
        }
        window.len() as f64 / self.hourly_cap as f64
    }
}

fn prune_window(window: &mut VecDeque<Instant>) {
    let cutoff = Duration::from_secs(3600);
    while let Some(front) = window.front() {
        if front.elapsed() > cutoff {
            window.pop_front();
        } else {
            break;
        }
    }
}

pub type SharedRateLimiter = Arc<RateLimiter>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(200), 1_000_000, Duration::from_millis(1));
        let start = StdInstant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn enforces_hourly_cap() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 2, Duration::from_millis(1));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.current_utilization(), 1.0);
        // A third acquire would need to wait ~an hour; we don't block the
        // test suite on that, we just assert the cap was reached.
    }

    #[tokio::test]
    async fn throttle_backoff_follows_the_doubling_sequence() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 1_000_000, Duration::from_millis(20));
        let start = StdInstant::now();
        limiter.report_throttled(1).await;
        let first = start.elapsed();
        assert!(first >= Duration::from_millis(18) && first < Duration::from_millis(80));

        let start = StdInstant::now();
        limiter.report_throttled(2).await;
        let second = start.elapsed();
        assert!(second >= first, "attempt 2 must back off at least as long as attempt 1");
    }
}
