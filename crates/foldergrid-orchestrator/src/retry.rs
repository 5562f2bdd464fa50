//! Timeouts and bounded retries around engine calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use foldergrid_core::EnginePolicy;

use crate::engine::{EngineError, EngineResult};

/// How many times a retryable engine error is retried, and the first delay.
/// Each further delay doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op`, retrying transient and unreachable errors.
    ///
    /// Timeouts and hard failures surface immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut delay = self.backoff;
        let mut retries = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && retries < self.attempts => {
                    retries += 1;
                    warn!(call = what, attempt = retries, of = self.attempts, ?delay, error = %e, "retrying engine call");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

impl From<&EnginePolicy> for RetryPolicy {
    fn from(policy: &EnginePolicy) -> Self {
        Self::new(policy.retry_attempts, policy.retry_backoff)
    }
}

/// Bound an engine call by `limit`.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = EngineResult<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(limit)),
    }
}
