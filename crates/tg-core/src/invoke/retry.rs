//! Retry middleware with exponential backoff.
//!
//! Failures are handled by category:
//! - `RateLimited(d)`: wait `d` plus a small slack, then resend the same
//!   request. These waits do not consume the backoff budget.
//! - `Transient`: wait a jittered, geometrically growing delay and retry until
//!   the elapsed budget is spent.
//! - `Permanent` and `Cancelled`: returned immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Invoker, Middleware, SharedInvoker};
use crate::errors::{ErrorCategory, InvokeError};
use crate::rpc::{Request, Response};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Total time spent on transient failures before giving up; `None` retries forever.
    pub max_elapsed: Option<Duration>,
    /// Fraction of each delay randomized in both directions (0 disables jitter).
    pub randomization_factor: f64,
    /// Added to every server-requested rate-limit wait.
    pub rate_limit_slack: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Some(Duration::from_secs(15 * 60)),
            randomization_factor: 0.5,
            rate_limit_slack: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.initial_interval,
            started: Instant::now(),
            excluded: Duration::ZERO,
        }
    }
}

impl Middleware for RetryPolicy {
    fn wrap(self, inner: SharedInvoker) -> SharedInvoker {
        Arc::new(Retry::new(inner, self))
    }
}

/// Backoff state for one logical call.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
    excluded: Duration,
}

impl Backoff {
    /// Delay before the next transient retry, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        if let Some(max) = self.policy.max_elapsed {
            if elapsed >= max {
                return None;
            }
        }

        let delay = jitter(self.current, self.policy.randomization_factor);
        let grown = self.current.mul_f64(self.policy.multiplier.max(1.0));
        self.current = grown.min(self.policy.max_interval);

        if let Some(max) = self.policy.max_elapsed {
            if elapsed.saturating_add(delay) > max {
                return None;
            }
        }
        Some(delay)
    }

    /// Remove time spent outside the backoff schedule from the budget.
    pub fn exclude(&mut self, spent: Duration) {
        self.excluded = self.excluded.saturating_add(spent);
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed().saturating_sub(self.excluded)
    }
}

fn jitter(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }
    let base = interval.as_secs_f64();
    let delta = base * factor.min(1.0);
    let secs = rand::thread_rng().gen_range((base - delta)..=(base + delta));
    Duration::from_secs_f64(secs.max(0.0))
}

/// Sleep for `delay` unless `cancel` fires first.
async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), InvokeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InvokeError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub struct Retry {
    inner: SharedInvoker,
    policy: RetryPolicy,
}

impl Retry {
    pub fn new(inner: SharedInvoker, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Invoker for Retry {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        let mut backoff = self.policy.backoff();
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(InvokeError::Cancelled);
            }
            attempt += 1;

            let err = match self.inner.invoke(cancel, request).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            match err.category() {
                ErrorCategory::RateLimited => {
                    let wait = err
                        .retry_after()
                        .unwrap_or_default()
                        .saturating_add(self.policy.rate_limit_slack);
                    log::warn!(
                        "{} rate limited (attempt {attempt}), waiting {wait:?}",
                        request.method
                    );
                    pause(cancel, wait).await?;
                    backoff.exclude(wait);
                }
                ErrorCategory::Transient => match backoff.next_delay() {
                    Some(delay) => {
                        log::debug!(
                            "{} failed (attempt {attempt}): {err}; retrying in {delay:?}",
                            request.method
                        );
                        pause(cancel, delay).await?;
                    }
                    None => return Err(err),
                },
                ErrorCategory::Permanent | ErrorCategory::Cancelled => return Err(err),
            }
        }
    }
}
