use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// States a `BackfillJob` can occupy. Modeled as a tagged enum rather than
/// bare strings at the boundary per the Design Notes; the `sqlx::Type`
/// mapping is what actually touches the wire (a Postgres enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "backfill_status", rename_all = "snake_case")]
pub enum BackfillState {
    Pending,
    InProgress,
    RateLimited,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BackfillJob {
    pub id: i64,
    pub asset_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BackfillState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub retry_after: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The outcome of one claimed-job attempt, as classified by the caller
/// from a `FetchError` (or a plain success). Kept separate from
/// `FetchError` so the transition function does not need to know about
/// HTTP or the price provider at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Throttled,
    Transient,
    NotFound,
}

/// What the backfill engine should do to a job after one attempt,
/// computed by the pure `next_state` transition function below.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub status: BackfillState,
    pub attempts: i32,
    pub retry_after: Option<chrono::Duration>,
    pub terminal: bool,
}

/// Total transition function for the BackfillJob state machine (spec.md
/// §4.4). `attempts` is the counter *before* this attempt; the function
/// returns the counter *after*. Throttle retries never exhaust the
/// transient retry budget: a throttle does not increment `attempts`.
///
/// `base_backoff_minutes` is the 5-minute base for exponential retry
/// delays on transient/bad-data failures (`5 * 2^(attempts-1)` minutes).
pub fn next_state(
    outcome: AttemptOutcome,
    attempts: i32,
    max_attempts: i32,
    base_backoff_minutes: i64,
    throttle_backoff: chrono::Duration,
) -> Transition {
    match outcome {
        AttemptOutcome::Success => Transition {
            status: BackfillState::Completed,
            attempts,
            retry_after: None,
            terminal: true,
        },
        AttemptOutcome::NotFound => Transition {
            status: BackfillState::Failed,
            attempts,
            retry_after: None,
            terminal: true,
        },
        AttemptOutcome::Throttled => Transition {
            status: BackfillState::RateLimited,
            attempts,
            retry_after: Some(throttle_backoff),
            terminal: false,
        },
        AttemptOutcome::Transient => {
            let attempts = attempts + 1;
            if attempts >= max_attempts {
                Transition {
                    status: BackfillState::Failed,
                    attempts,
                    retry_after: None,
                    terminal: true,
                }
            } else {
                let minutes = base_backoff_minutes * (1i64 << (attempts - 1).max(0));
                Transition {
                    status: BackfillState::Pending,
                    attempts,
                    retry_after: Some(chrono::Duration::minutes(minutes)),
                    terminal: false,
                }
            }
        }
    }
}

/// Eligibility filter for `claim`: pending/rate_limited jobs whose
/// `retry_after` has elapsed (or is unset), oldest first. Expressed here
/// so the same predicate can be unit-tested without touching SQL; the
/// real claim path additionally does this filtering in the `UPDATE ...
/// WHERE` clause under row-level locking.
pub fn is_eligible(status: BackfillState, retry_after: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(status, BackfillState::Pending | BackfillState::RateLimited)
        && retry_after.map(|t| t <= now).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_completes_regardless_of_attempts() {
        let t = next_state(AttemptOutcome::Success, 3, 5, 5, chrono::Duration::seconds(5));
        assert_eq!(t.status, BackfillState::Completed);
        assert!(t.terminal);
    }

    #[test]
    fn not_found_fails_immediately_even_on_first_attempt() {
        let t = next_state(AttemptOutcome::NotFound, 0, 5, 5, chrono::Duration::seconds(5));
        assert_eq!(t.status, BackfillState::Failed);
        assert_eq!(t.attempts, 0);
        assert!(t.terminal);
    }

    #[test]
    fn transient_retries_with_exponential_backoff_until_ceiling() {
        let mut attempts = 0;
        let mut delays = vec![];
        loop {
            let t = next_state(AttemptOutcome::Transient, attempts, 5, 5, chrono::Duration::seconds(5));
            attempts = t.attempts;
            if t.terminal {
                assert_eq!(t.status, BackfillState::Failed);
                assert_eq!(attempts, 5);
                break;
            }
            delays.push(t.retry_after.unwrap().num_minutes());
        }
        assert_eq!(delays, vec![5, 10, 20, 40]);
    }

    #[test]
    fn throttle_does_not_consume_the_transient_retry_budget() {
        let t1 = next_state(AttemptOutcome::Throttled, 4, 5, 5, chrono::Duration::seconds(5));
        assert_eq!(t1.status, BackfillState::RateLimited);
        assert_eq!(t1.attempts, 4, "throttle must not increment the transient attempts counter");
        assert!(!t1.terminal);
    }

    #[test]
    fn eligibility_respects_retry_after() {
        let now = Utc::now();
        assert!(is_eligible(BackfillState::Pending, None, now));
        assert!(!is_eligible(
            BackfillState::RateLimited,
            Some(now + chrono::Duration::minutes(1)),
            now
        ));
        assert!(is_eligible(
            BackfillState::RateLimited,
            Some(now - chrono::Duration::minutes(1)),
            now
        ));
        assert!(!is_eligible(BackfillState::Completed, None, now));
        assert!(!is_eligible(BackfillState::Failed, None, now));
    }
}
