//! Chat metering
//!
//! Messages are charged by length before they are stored. Members pay from
//! their spendable balance; unauthenticated visitors pay from a per-session
//! guest pool that never touches the ledger.

use credit_core::{ChatMessage, MessageStore, TransactionKind, GUEST_SENDER_ID};
use economics::constants::GUEST_STARTING_CREDITS;
use economics::PriceCalculator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::balance::BalanceLedger;
use crate::context::EngineContext;
use crate::{LedgerError, Result};

/// Credits available to one guest session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCreditPool {
    remaining: u64,
}

impl GuestCreditPool {
    pub fn new(remaining: u64) -> Self {
        Self { remaining }
    }

    /// A fresh session with the standard guest allowance
    pub fn seeded() -> Self {
        Self::new(GUEST_STARTING_CREDITS)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn try_spend(&mut self, amount: u64) -> Result<u64> {
        if amount > self.remaining {
            return Err(LedgerError::GuestCreditsExhausted {
                available: self.remaining,
                required: amount,
            });
        }
        self.remaining -= amount;
        Ok(self.remaining)
    }

    pub fn refund(&mut self, amount: u64) {
        self.remaining = self.remaining.saturating_add(amount);
    }
}

impl Default for GuestCreditPool {
    fn default() -> Self {
        Self::seeded()
    }
}

/// Who pays for a message
#[derive(Debug)]
pub enum Payer<'a> {
    Member(&'a str),
    Guest(&'a mut GuestCreditPool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message: ChatMessage,
    pub cost: u64,
    /// Member spendable balance or guest pool after the charge
    pub remaining: u64,
}

#[derive(Clone)]
pub struct ChatMeter {
    ctx: EngineContext,
    ledger: BalanceLedger,
    messages: Arc<dyn MessageStore>,
}

impl ChatMeter {
    pub fn new(ctx: EngineContext, ledger: BalanceLedger, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            ctx,
            ledger,
            messages,
        }
    }

    pub fn quote(&self, text: &str) -> u64 {
        PriceCalculator::chat_cost(text, self.ctx.policy().chat_rate_per_1000_chars)
    }

    pub async fn send_message(
        &self,
        payer: Payer<'_>,
        recipient: &str,
        text: &str,
    ) -> Result<SentMessage> {
        self.ledger.account(recipient).await?;
        let cost = self.quote(text);

        match payer {
            Payer::Member(user) => self.send_as_member(user, recipient, text, cost).await,
            Payer::Guest(pool) => self.send_as_guest(pool, recipient, text, cost).await,
        }
    }

    async fn send_as_member(
        &self,
        user: &str,
        recipient: &str,
        text: &str,
        cost: u64,
    ) -> Result<SentMessage> {
        let remaining = if cost == 0 {
            self.ledger.account(user).await?.spendable_balance
        } else {
            self.ledger
                .debit(
                    user,
                    cost,
                    &format!("Chat message to {}", recipient),
                    TransactionKind::ChatDebit,
                )
                .await?
                .spendable_balance
        };

        let message = ChatMessage::new(user, recipient, text, cost, self.ctx.now());
        if let Err(e) = self.persist(message.clone()).await {
            if cost > 0 && !may_have_landed(&e) {
                let refund = self
                    .ledger
                    .credit(
                        user,
                        cost,
                        &format!("Refund for undelivered message to {}", recipient),
                        TransactionKind::ChatRefund,
                    )
                    .await;
                if let Err(refund_err) = refund {
                    tracing::error!(
                        "{} stays charged {} credits: message {} not stored ({}), refund failed: {}",
                        user,
                        cost,
                        message.id,
                        e,
                        refund_err
                    );
                    return Err(refund_err);
                }
            }
            return Err(e);
        }

        Ok(SentMessage {
            message,
            cost,
            remaining,
        })
    }

    async fn send_as_guest(
        &self,
        pool: &mut GuestCreditPool,
        recipient: &str,
        text: &str,
        cost: u64,
    ) -> Result<SentMessage> {
        let remaining = match pool.try_spend(cost) {
            Ok(remaining) => remaining,
            Err(e) => {
                tracing::debug!("guest message to {} rejected: {}", recipient, e);
                return Err(e);
            }
        };

        let message = ChatMessage::new(GUEST_SENDER_ID, recipient, text, cost, self.ctx.now());
        if let Err(e) = self.persist(message.clone()).await {
            if !may_have_landed(&e) {
                pool.refund(cost);
            }
            return Err(e);
        }

        Ok(SentMessage {
            message,
            cost,
            remaining,
        })
    }

    async fn persist(&self, message: ChatMessage) -> Result<()> {
        let id = message.id.clone();
        let result = self
            .ctx
            .call("insert_message", || {
                self.messages.insert_message(message.clone())
            })
            .await;

        match &result {
            Ok(()) => tracing::info!(
                "message {} from {} to {} ({} credits)",
                id,
                message.sender_id,
                message.receiver_id,
                message.cost
            ),
            Err(e) if may_have_landed(e) => {
                tracing::warn!("message {} may have been stored, charge kept: {}", id, e)
            }
            Err(e) => tracing::warn!("message {} not stored, charge reversed: {}", id, e),
        }
        result
    }

    pub async fn inbox(&self, receiver: &str) -> Result<Vec<ChatMessage>> {
        self.ctx
            .call("messages_for", || self.messages.messages_for(receiver))
            .await
    }
}

/// A timed-out insert may still have been written, so its charge stands.
fn may_have_landed(err: &LedgerError) -> bool {
    matches!(err, LedgerError::StoreTimeout(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use credit_core::{MemoryStore, StoreError, StoreResult, SystemClock};
    use economics::{EconomyPolicy, PolicyHandle};
    use std::time::Duration;

    /// Stores the message, then hangs past any reasonable call timeout
    struct StallAfterWrite(Arc<MemoryStore>);

    #[async_trait]
    impl MessageStore for StallAfterWrite {
        async fn insert_message(&self, message: ChatMessage) -> StoreResult<()> {
            self.0.insert_message(message).await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn messages_for(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>> {
            self.0.messages_for(receiver).await
        }
    }

    /// Rejects the insert and takes the ledger down with it
    struct FailWithLedger(Arc<MemoryStore>);

    #[async_trait]
    impl MessageStore for FailWithLedger {
        async fn insert_message(&self, _message: ChatMessage) -> StoreResult<()> {
            self.0.fail_next_writes(10);
            Err(StoreError::Backend("message store offline".to_string()))
        }

        async fn messages_for(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>> {
            self.0.messages_for(receiver).await
        }
    }

    async fn meter_with(
        store: Arc<MemoryStore>,
        messages: Arc<dyn MessageStore>,
    ) -> ChatMeter {
        let policy = EconomyPolicy {
            chat_rate_per_1000_chars: 50,
            ..EconomyPolicy::default()
        };
        let mut ctx = EngineContext::new(
            store,
            PolicyHandle::new(policy).unwrap(),
            Arc::new(SystemClock),
        );
        ctx.retry = RetryPolicy {
            call_timeout: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let ledger = BalanceLedger::new(ctx.clone());
        ledger.open_account("creator").await.unwrap();
        ledger.open_account("fan").await.unwrap();
        ledger.top_up("fan", 100, "card").await.unwrap();
        ChatMeter::new(ctx, ledger, messages)
    }

    async fn meter() -> (ChatMeter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = EngineContext::new(store.clone(), PolicyHandle::default(), Arc::new(SystemClock));
        let ledger = BalanceLedger::new(ctx.clone());
        ledger.open_account("creator").await.unwrap();
        (ChatMeter::new(ctx, ledger, store.clone()), store)
    }

    #[test]
    fn test_guest_pool_spend_and_refund() {
        let mut pool = GuestCreditPool::seeded();
        assert_eq!(pool.try_spend(30).unwrap(), 70);
        assert_eq!(
            pool.try_spend(71),
            Err(LedgerError::GuestCreditsExhausted {
                available: 70,
                required: 71
            })
        );
        pool.refund(30);
        assert_eq!(pool.remaining(), 100);
    }

    #[tokio::test]
    async fn test_guest_message_uses_sentinel_sender() {
        let (meter, _) = meter().await;
        let mut pool = GuestCreditPool::seeded();

        let sent = meter
            .send_message(Payer::Guest(&mut pool), "creator", &"x".repeat(100))
            .await
            .unwrap();
        assert_eq!(sent.cost, 5);
        assert_eq!(sent.remaining, 95);
        assert!(sent.message.is_from_guest());
        assert_eq!(pool.remaining(), 95);
    }

    #[tokio::test]
    async fn test_empty_message_is_free_for_members() {
        let (meter, _) = meter().await;
        meter.ledger.open_account("fan").await.unwrap();

        let sent = meter
            .send_message(Payer::Member("fan"), "creator", "")
            .await
            .unwrap();
        assert_eq!(sent.cost, 0);
        assert!(meter.ledger.history("fan").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_recipient() {
        let (meter, _) = meter().await;
        let mut pool = GuestCreditPool::seeded();
        assert_eq!(
            meter
                .send_message(Payer::Guest(&mut pool), "nobody", "hi")
                .await,
            Err(LedgerError::AccountNotFound("nobody".to_string()))
        );
        assert_eq!(pool.remaining(), 100);
    }

    #[tokio::test]
    async fn test_guest_pool_restored_when_store_down() {
        let (meter, store) = meter().await;
        store.set_messages_down(true);
        let mut pool = GuestCreditPool::seeded();

        let result = meter
            .send_message(Payer::Guest(&mut pool), "creator", "hello")
            .await;
        assert!(matches!(result, Err(LedgerError::StoreWriteFailed(_))));
        assert_eq!(pool.remaining(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_member_message_keeps_charge() {
        let store = Arc::new(MemoryStore::new());
        let meter = meter_with(store.clone(), Arc::new(StallAfterWrite(store.clone()))).await;

        let result = meter
            .send_message(Payer::Member("fan"), "creator", &"a".repeat(1_000))
            .await;
        assert_eq!(result, Err(LedgerError::StoreTimeout(Duration::from_millis(100))));

        assert_eq!(store.messages_for("creator").await.unwrap().len(), 1);
        assert_eq!(meter.ledger.account("fan").await.unwrap().spendable_balance, 50);
        let kinds: Vec<_> = meter
            .ledger
            .history("fan")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert!(!kinds.contains(&TransactionKind::ChatRefund));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_guest_message_keeps_charge() {
        let store = Arc::new(MemoryStore::new());
        let meter = meter_with(store.clone(), Arc::new(StallAfterWrite(store.clone()))).await;
        let mut pool = GuestCreditPool::seeded();

        let result = meter
            .send_message(Payer::Guest(&mut pool), "creator", &"a".repeat(1_000))
            .await;
        assert!(matches!(result, Err(LedgerError::StoreTimeout(_))));
        assert_eq!(store.messages_for("creator").await.unwrap().len(), 1);
        assert_eq!(pool.remaining(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refund_surfaces_and_member_stays_charged() {
        let store = Arc::new(MemoryStore::new());
        let meter = meter_with(store.clone(), Arc::new(FailWithLedger(store.clone()))).await;

        let result = meter
            .send_message(Payer::Member("fan"), "creator", &"a".repeat(1_000))
            .await;
        assert!(matches!(result, Err(LedgerError::StoreWriteFailed(_))));

        store.fail_next_writes(0);
        assert_eq!(meter.ledger.account("fan").await.unwrap().spendable_balance, 50);
        assert!(store.messages_for("creator").await.unwrap().is_empty());
    }
}
