//! Pacing and fixed-cooldown retry shared by every model backend.
//!
//! Each attempt is preceded by a short pacing delay that keeps a sequential
//! run under the provider's steady-state rate limit. A failed attempt waits a
//! fixed cooldown (or the backend's `Retry-After`, when it sends one) before
//! the next. There is no exponential growth: provider limits here are per
//! minute, so one full window is always enough.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::client::{ClientError, ModelClient};
use crate::error::{HaystackError, HaystackResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after a failed attempt.
    pub cooldown: Duration,
    /// Wait before every attempt.
    pub pacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(61),
            pacing: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

/// Blocking wait, abstracted so tests can observe the schedule.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Attempt counters, kept apart so rate limiting shows up on its own.
#[derive(Debug, Default)]
pub struct RetryStats {
    pub calls: AtomicU64,
    pub attempts: AtomicU64,
    pub transient_failures: AtomicU64,
    pub rate_limited: AtomicU64,
}

impl RetryStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.calls.load(Ordering::Relaxed),
            self.attempts.load(Ordering::Relaxed),
            self.transient_failures.load(Ordering::Relaxed),
            self.rate_limited.load(Ordering::Relaxed),
        )
    }
}

/// Wraps a single-attempt [`ModelClient`] with the pacing/retry contract.
pub struct RetryingClient {
    inner: Box<dyn ModelClient>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    stats: RetryStats,
}

impl RetryingClient {
    /// Use the policy advertised by the backend.
    pub fn new(inner: Box<dyn ModelClient>) -> Self {
        let policy = inner.retry_policy();
        Self::with_policy(inner, policy)
    }

    pub fn with_policy(inner: Box<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleeper: Arc::new(ThreadSleeper),
            stats: RetryStats::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Send `prompt`, returning the trimmed completion or a terminal error.
    pub fn complete(&self, prompt: &str) -> HaystackResult<String> {
        let max_attempts = self.policy.max_attempts.max(1);
        let model = self.inner.model();
        self.stats.calls.fetch_add(1, Ordering::Relaxed);

        let mut attempt = 1;
        loop {
            if !self.policy.pacing.is_zero() {
                self.sleeper.sleep(self.policy.pacing);
            }
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);
            debug!(model, attempt, prompt_bytes = prompt.len(), "sending prompt");

            let err = match self.inner.complete(prompt) {
                Ok(text) => return Ok(text.trim().to_string()),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(model, attempt, "not retrying: {err}");
                return Err(HaystackError::Backend(err));
            }

            let wait = match &err {
                ClientError::RateLimited {
                    retry_after: Some(after),
                    ..
                } => *after,
                _ => self.policy.cooldown,
            };

            if err.is_rate_limit() {
                self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.transient_failures.fetch_add(1, Ordering::Relaxed);
            }

            if attempt >= max_attempts {
                error!(model, attempts = attempt, "retries exhausted: {err}");
                return Err(HaystackError::ExhaustedRetries {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                model,
                attempt,
                rate_limited = err.is_rate_limit(),
                wait_secs = wait.as_secs_f64(),
                "attempt failed, retrying: {err}"
            );
            self.sleeper.sleep(wait);
            attempt += 1;
        }
    }
}
