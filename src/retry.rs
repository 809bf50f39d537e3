//! Bounded polling with backoff.
//!
//! All waiting in the crate goes through [`Clock`] so tests can run the
//! full lifecycle without wall-clock delays.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval_secs: u64,
    /// Growth factor of the interval between attempts; 1 keeps it fixed.
    #[serde(default = "default_backoff")]
    pub backoff: u32,
    #[serde(default)]
    pub max_interval_secs: Option<u64>,
}

fn default_backoff() -> u32 {
    1
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval_secs: interval.as_secs(),
            backoff: 1,
            max_interval_secs: None,
        }
    }

    /// Delay after the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff.max(1)).saturating_pow(attempt);
        let secs = self.interval_secs.saturating_mul(factor);
        let secs = match self.max_interval_secs {
            Some(max) => secs.min(max),
            None => secs,
        };
        Duration::from_secs(secs)
    }
}

/// Runs `op` until it yields a value or the policy runs out of attempts.
///
/// `Ok(None)` means every attempt came back empty. Errors end the loop at once.
pub async fn poll<T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut op: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 0..policy.attempts {
        if let Some(value) = op(attempt).await? {
            return Ok(Some(value));
        }
        if attempt + 1 < policy.attempts {
            clock.sleep(policy.delay(attempt)).await;
        }
    }
    Ok(None)
}
