//! Shared handles every engine is built from

use chrono::{DateTime, Utc};
use credit_core::{Clock, LedgerStore, StoreResult};
use economics::{EconomyPolicy, PolicyHandle};
use std::future::Future;
use std::sync::Arc;

use crate::retry::{with_retry, RetryPolicy};
use crate::Result;

#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn LedgerStore>,
    pub policy: PolicyHandle,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
}

impl EngineContext {
    pub fn new(store: Arc<dyn LedgerStore>, policy: PolicyHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn policy(&self) -> EconomyPolicy {
        self.policy.snapshot()
    }

    /// Run a store call under this context's timeout and retry policy
    pub async fn call<T, F, Fut>(&self, op: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        with_retry(&self.retry, op, call).await
    }
}
