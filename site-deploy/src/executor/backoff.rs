//! Exponential backoff with a total time budget.

use crate::config::RetryConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Retry schedule for a single file upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Once this much time has passed since the first attempt, no further
    /// attempt is scheduled.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            // NaN falls back to 1.0; oversized factors are capped in `next_delay`
            multiplier: config.multiplier.max(1.0),
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}

impl RetryPolicy {
    /// Start a new schedule; the elapsed clock starts now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.initial_interval,
            started: Instant::now(),
        }
    }
}

/// Running state of one retry schedule.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Delay before the next attempt, or `None` when the budget would be
    /// exceeded by waiting it out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.current =
            Duration::try_from_secs_f64(self.current.as_secs_f64() * self.policy.multiplier)
                .map_or(self.policy.max_interval, |next| next.min(self.policy.max_interval));

        if self.started.elapsed().saturating_add(delay) > self.policy.max_elapsed {
            return None;
        }

        Some(delay)
    }
}
