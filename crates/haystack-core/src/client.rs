use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Failure of a single completion attempt, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Timeouts, 5xx, broken connections, unreadable bodies.
    #[error("transient failure: {0}")]
    Transient(String),

    /// HTTP 429. `retry_after` carries the backend's own cooldown if it sent one.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Bad request or bad credentials. Retrying cannot help.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// One model backend: send a prompt, get one completion back.
///
/// Implementations make exactly one attempt per call. Pacing, retries and
/// cooldowns are layered on by [`crate::RetryingClient`], using the policy the
/// backend advertises through [`ModelClient::retry_policy`].
pub trait ModelClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, ClientError>;

    /// Model identifier, used to key the result store.
    fn model(&self) -> &str;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

impl<C: ModelClient + ?Sized> ModelClient for Box<C> {
    fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        (**self).complete(prompt)
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn retry_policy(&self) -> RetryPolicy {
        (**self).retry_policy()
    }
}
