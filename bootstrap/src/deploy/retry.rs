//! Bounded retry and polling with a fixed delay

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::storage::settings::RetrySettings;

/// Retry policy: at most `max_attempts` attempts, `delay` between two
/// consecutive attempts. There is no sleep before the first attempt or after
/// the last one, so a permanently failing operation waits
/// `(max_attempts - 1) * delay` in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total time spent sleeping when every attempt fails
    pub fn total_wait(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.delay())
    }
}

/// Attempt counter for a fixed-delay loop
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl FixedBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: RetryPolicy::new(policy.max_attempts, policy.delay),
            attempt: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of the attempt in progress (1-based, 0 before the first)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start the next attempt and return its number, or `None` when the
    /// attempts are exhausted
    pub fn begin(&mut self) -> Option<u32> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Whether the attempt in progress is the last allowed one
    pub fn is_last(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }

    /// Sleep before the next attempt. Returns `false` without sleeping when
    /// no attempt is left.
    pub async fn wait<S, F>(&self, sleep_fn: S) -> bool
    where
        S: FnOnce(Duration) -> F,
        F: Future<Output = ()>,
    {
        if self.is_last() {
            return false;
        }
        sleep_fn(self.policy.delay).await;
        true
    }
}

/// Operation gave up after every attempt failed
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Each failure is logged as `"<label> attempt failed (n/max): <error>"`.
pub async fn retry<T, E, Op, Fut, S, SF>(
    policy: RetryPolicy,
    label: &str,
    sleep_fn: S,
    mut op: Op,
) -> Result<T, RetryExhausted<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    S: Fn(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let mut backoff = FixedBackoff::new(policy);
    let policy = *backoff.policy();

    while let Some(attempt) = backoff.begin() {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{} attempt failed ({}/{}): {}", label, attempt, policy.max_attempts, e);
                if backoff.is_last() {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                info!("Retrying {} in {:?}", label, policy.delay);
                backoff.wait(&sleep_fn).await;
            }
        }
    }

    unreachable!("retry policy allows at least one attempt")
}

/// Poll `probe` until it reports ready or the policy is exhausted.
///
/// `probe` returns `Ok(())` when ready and the reason it is not ready
/// otherwise; each reason is logged as `"<label> not ready (n/max): <reason>"`.
pub async fn poll_until<R, Op, Fut, S, SF>(
    policy: RetryPolicy,
    label: &str,
    sleep_fn: S,
    mut probe: Op,
) -> Result<u32, RetryExhausted<R>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), R>>,
    R: Display,
    S: Fn(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let mut backoff = FixedBackoff::new(policy);
    let policy = *backoff.policy();

    while let Some(attempt) = backoff.begin() {
        match probe(attempt).await {
            Ok(()) => return Ok(attempt),
            Err(reason) => {
                info!("{} not ready ({}/{}): {}", label, attempt, policy.max_attempts, reason);
                if !backoff.wait(&sleep_fn).await {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: reason,
                    });
                }
            }
        }
    }

    unreachable!("poll policy allows at least one attempt")
}
