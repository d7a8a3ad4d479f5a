//! Store call timeouts and retries
//!
//! Transient store failures are retried with exponential backoff. A call that
//! times out is not retried: the write may have landed, so the caller gets
//! `StoreTimeout` and must re-read before acting again.

use credit_core::StoreResult;
use std::future::Future;
use std::time::Duration;

use crate::{LedgerError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on a single store call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    op,
                    attempt,
                    policy.max_attempts,
                    e,
                    backoff
                );
            }
            Ok(Err(e)) if e.is_transient() => {
                tracing::error!("{} failed after {} attempts: {}", op, attempt, e);
                return Err(LedgerError::StoreWriteFailed(format!(
                    "{} failed after {} attempts: {}",
                    op, attempt, e
                )));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::error!("{} timed out after {:?}", op, policy.call_timeout);
                return Err(LedgerError::StoreTimeout(policy.call_timeout));
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff);
        attempt += 1;
    }
}
