//! Retry policy applied to throttled requests.

use std::time::Duration;

use rand::Rng;

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(20);

/// Bounded exponential backoff for requests the service throttled.
///
/// Only HTTP 429 responses are retried; every other failure surfaces on
/// first occurrence. A request is sent at most `max_attempts` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    max_attempts: u32,
    max_backoff: Duration,
}

impl RetryConfig {
    /// Creates a policy sending at most `max_attempts` requests, sleeping
    /// at most `max_backoff` between attempts.
    pub fn new(max_attempts: u32, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_backoff,
        }
    }

    /// Maximum number of times one request is sent.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound on a single backoff sleep.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Backoff to sleep after throttled attempt `attempt` (1-based):
    /// `min(max_backoff, 2^attempt * U(0,1) seconds)`.
    ///
    /// The jitter factor is sampled fresh per attempt so that concurrent
    /// clients do not retry in lockstep.
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::rng().random();
        let exponential = 2f64.powi(attempt.min(1_000) as i32) * jitter;
        // Cap before converting; from_secs_f64 rejects huge values.
        Duration::from_secs_f64(exponential.min(self.max_backoff.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF)
    }
}
