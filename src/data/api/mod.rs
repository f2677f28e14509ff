//! Read-only match-data sources

pub mod tba;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::{AceError, Award, Event, Match, Ranking, Result, RetryConfig, Team, TeamId};

/// Keyed lookups the ingestion pipeline needs. Implementations are shared
/// across worker threads.
pub trait MatchSource: Sync {
    fn events(&self, year: u16) -> Result<Vec<Event>>;

    fn event_teams(&self, event_key: &str) -> Result<Vec<Team>>;

    fn event_rankings(&self, event_key: &str) -> Result<Vec<Ranking>>;

    fn event_matches(&self, event_key: &str) -> Result<Vec<Match>>;

    fn team_event_matches(&self, team: TeamId, event_key: &str) -> Result<Vec<Match>>;

    fn event_awards(&self, event_key: &str) -> Result<Vec<Award>>;
}

/// Cooperative cancellation flag shared between a batch and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation. Returns false if
    /// cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining -= step;
        }
        !self.is_cancelled()
    }
}

/// Exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// None retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max_attempts: config.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts, or the token is cancelled. Only transient errors are retried.
pub fn with_retry<T, F>(policy: &RetryPolicy, cancel: &CancelToken, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(AceError::Cancelled);
        }
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                attempt += 1;
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
                let delay = policy.delay(attempt - 1);
                log::warn!(
                    "Attempt {} failed: {} (retrying in {:?})",
                    attempt,
                    e,
                    delay
                );
                if !cancel.sleep(delay) {
                    return Err(AceError::Cancelled);
                }
            }
        }
    }
}

/// Immutable pool of API credentials; each request picks one at random
#[derive(Debug, Clone, Default)]
pub struct KeyPool(Arc<[String]>);

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        KeyPool(keys.into())
    }

    pub fn pick(&self) -> Option<&str> {
        self.0.choose(&mut rand::thread_rng()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    fn unavailable() -> AceError {
        AceError::Status {
            status: 503,
            url: "https://example.invalid".to_string(),
        }
    }

    #[test]
    fn test_succeeds_on_third_attempt() {
        let calls = Cell::new(0);
        let result = with_retry(&instant(), &CancelToken::new(), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(unavailable())
            } else {
                Ok("data")
            }
        });
        assert_eq!(result.unwrap(), "data");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&instant(), &CancelToken::new(), || {
            calls.set(calls.get() + 1);
            Err(AceError::Status {
                status: 404,
                url: "x".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_attempt_limit() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: Some(4),
            ..instant()
        };
        let result: Result<()> = with_retry(&policy, &CancelToken::new(), || {
            calls.set(calls.get() + 1);
            Err(unavailable())
        });
        assert!(matches!(result, Err(AceError::Status { status: 503, .. })));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_cancellation_stops_retrying() {
        let cancel = CancelToken::new();
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&instant(), &cancel, || {
            calls.set(calls.get() + 1);
            if calls.get() == 5 {
                cancel.cancel();
            }
            Err(unavailable())
        });
        assert!(matches!(result, Err(AceError::Cancelled)));
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
        assert_eq!(policy.delay(4), Duration::from_millis(5000));
        assert_eq!(policy.delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_key_pool() {
        assert!(KeyPool::default().pick().is_none());
        let pool = KeyPool::new(vec!["a".to_string(), "b".to_string()]);
        for _ in 0..20 {
            let key = pool.pick().unwrap();
            assert!(key == "a" || key == "b");
        }
    }
}
