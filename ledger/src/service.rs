//! The assembled economy
//!
//! `Economy` wires every engine to one store, one policy handle and one
//! clock. It is cheap to clone and is what the HTTP layer holds.

use credit_core::{Clock, LedgerStore, MemoryStore, MessageStore, SystemClock};
use economics::{EconomyPolicy, PolicyHandle};
use std::sync::Arc;
use std::time::Duration;

use crate::balance::BalanceLedger;
use crate::chat::ChatMeter;
use crate::context::EngineContext;
use crate::provider::{ManualBilling, PaymentProvider};
use crate::retry::RetryPolicy;
use crate::reward::RewardEngine;
use crate::subscription::SubscriptionEngine;
use crate::unlock::ContentUnlockEngine;
use crate::withdrawal::WithdrawalGate;
use crate::Result;

#[derive(Clone)]
pub struct Economy {
    pub ledger: BalanceLedger,
    pub content: ContentUnlockEngine,
    pub rewards: RewardEngine,
    pub subscriptions: SubscriptionEngine,
    pub chat: ChatMeter,
    pub withdrawals: WithdrawalGate,
    policy: PolicyHandle,
}

impl Economy {
    pub fn builder() -> EconomyBuilder {
        EconomyBuilder::default()
    }

    /// Everything in memory with default policy; used by tests and demos
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::builder()
            .store(store.clone())
            .messages(store)
            .build()
    }

    pub fn policy(&self) -> EconomyPolicy {
        self.policy.snapshot()
    }

    /// Swap the live policy; engines pick it up on their next call
    pub fn replace_policy(&self, policy: EconomyPolicy) -> Result<EconomyPolicy> {
        let previous = self.policy.replace(policy)?;
        tracing::info!(
            "policy updated: commission {} -> {}, credit rate {} -> {}",
            previous.commission,
            policy.commission,
            previous.credit_rate,
            policy.credit_rate
        );
        Ok(previous)
    }
}

pub struct EconomyBuilder {
    store: Option<Arc<dyn LedgerStore>>,
    messages: Option<Arc<dyn MessageStore>>,
    policy: PolicyHandle,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn PaymentProvider>,
    retry: RetryPolicy,
    reward_delay: Duration,
}

impl Default for EconomyBuilder {
    fn default() -> Self {
        Self {
            store: None,
            messages: None,
            policy: PolicyHandle::default(),
            clock: Arc::new(SystemClock),
            provider: Arc::new(ManualBilling),
            retry: RetryPolicy::default(),
            reward_delay: Duration::ZERO,
        }
    }
}

impl EconomyBuilder {
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn messages(mut self, messages: Arc<dyn MessageStore>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn policy(mut self, policy: PolicyHandle) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Simulated ad length before a reward is credited
    pub fn reward_delay(mut self, delay: Duration) -> Self {
        self.reward_delay = delay;
        self
    }

    /// Missing stores fall back to a shared in-memory store
    pub fn build(self) -> Economy {
        let fallback = Arc::new(MemoryStore::new());
        let store = self
            .store
            .unwrap_or_else(|| fallback.clone() as Arc<dyn LedgerStore>);
        let messages = self
            .messages
            .unwrap_or_else(|| fallback as Arc<dyn MessageStore>);

        let mut ctx = EngineContext::new(store, self.policy.clone(), self.clock);
        ctx.retry = self.retry;

        let ledger = BalanceLedger::new(ctx.clone());
        Economy {
            content: ContentUnlockEngine::new(ctx.clone()),
            rewards: RewardEngine::new(ctx.clone(), ledger.clone(), self.reward_delay),
            subscriptions: SubscriptionEngine::new(ctx.clone(), self.provider),
            chat: ChatMeter::new(ctx.clone(), ledger.clone(), messages),
            withdrawals: WithdrawalGate::new(ctx),
            ledger,
            policy: self.policy,
        }
    }
}
