//! In-memory ledger store
//!
//! All state lives behind one `RwLock`; each mutating call holds the write
//! guard for its whole check-then-mutate sequence.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::store::withdrawal_ready_at;
use crate::{
    Account, ChatMessage, ContentId, ContentItem, CreatorTransactionRecord, LedgerStore,
    MessageStore, PurchaseCommit, StoreError, StoreResult, SubscriptionRecord,
    SubscriptionRenewal, TransactionRecord, UserId,
};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    transactions: HashMap<UserId, Vec<TransactionRecord>>,
    sales: HashMap<UserId, Vec<CreatorTransactionRecord>>,
    unlocks: HashMap<UserId, HashSet<ContentId>>,
    content: HashMap<ContentId, ContentItem>,
    subscriptions: HashMap<UserId, SubscriptionRecord>,
    messages: Vec<ChatMessage>,
}

impl Inner {
    fn account_mut(&mut self, user: &str) -> StoreResult<&mut Account> {
        self.accounts
            .get_mut(user)
            .ok_or_else(|| StoreError::AccountNotFound(user.to_string()))
    }

    fn append(&mut self, record: TransactionRecord) {
        self.transactions
            .entry(record.account_id.clone())
            .or_default()
            .push(record);
    }

    fn credit(&mut self, user: &str, amount: u64) -> StoreResult<Account> {
        let account = self.account_mut(user)?;
        account.spendable_balance = account
            .spendable_balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(user.to_string()))?;
        Ok(account.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    pending_failures: AtomicU32,
    messages_down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` mutating calls fail with `Unavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make message inserts fail until reset
    pub fn set_messages_down(&self, down: bool) {
        self.messages_down.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        let taken = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn open_account(&self, user: &str, now: DateTime<Utc>) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user, now));
        Ok(account.clone())
    }

    async fn account(&self, user: &str) -> StoreResult<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(user).cloned())
    }

    async fn apply_credit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let account = inner.credit(user, amount)?;
        inner.append(record);
        Ok(account)
    }

    async fn apply_debit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let account = inner.account_mut(user)?;
        if account.spendable_balance < amount {
            return Err(StoreError::InsufficientFunds {
                available: account.spendable_balance,
                required: amount,
            });
        }
        account.spendable_balance -= amount;
        let account = account.clone();
        inner.append(record);
        Ok(account)
    }

    async fn commit_purchase(&self, commit: PurchaseCommit) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        if inner
            .unlocks
            .get(&commit.buyer_id)
            .is_some_and(|set| set.contains(&commit.content_id))
        {
            return Err(StoreError::AlreadyUnlocked(commit.content_id));
        }

        let creator = inner
            .accounts
            .get(&commit.creator_id)
            .ok_or_else(|| StoreError::AccountNotFound(commit.creator_id.clone()))?;
        let new_earned = creator
            .earned_balance
            .checked_add(commit.earnings)
            .ok_or_else(|| StoreError::Overflow(commit.creator_id.clone()))?;

        let buyer = inner.account_mut(&commit.buyer_id)?;
        if buyer.spendable_balance < commit.price {
            return Err(StoreError::InsufficientFunds {
                available: buyer.spendable_balance,
                required: commit.price,
            });
        }

        // All checks passed, nothing below can fail
        buyer.spendable_balance -= commit.price;
        let buyer = buyer.clone();
        inner.account_mut(&commit.creator_id)?.earned_balance = new_earned;
        inner.append(commit.buyer_record);
        inner
            .sales
            .entry(commit.creator_id)
            .or_default()
            .push(commit.sale_record);
        inner
            .unlocks
            .entry(commit.buyer_id)
            .or_default()
            .insert(commit.content_id);

        Ok(buyer)
    }

    async fn unlocked(&self, user: &str) -> StoreResult<HashSet<ContentId>> {
        Ok(self
            .inner
            .read()
            .await
            .unlocks
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_unlocked(&self, user: &str, content: &str) -> StoreResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .unlocks
            .get(user)
            .is_some_and(|set| set.contains(content)))
    }

    async fn put_content(&self, item: ContentItem) -> StoreResult<()> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .content
            .insert(item.id.clone(), item);
        Ok(())
    }

    async fn content(&self, id: &str) -> StoreResult<Option<ContentItem>> {
        Ok(self.inner.read().await.content.get(id).cloned())
    }

    async fn subscription(&self, user: &str) -> StoreResult<Option<SubscriptionRecord>> {
        Ok(self.inner.read().await.subscriptions.get(user).cloned())
    }

    async fn apply_subscription(
        &self,
        user: &str,
        record: SubscriptionRecord,
        grant: TransactionRecord,
    ) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let account = inner.credit(user, record.plan.monthly_credits)?;
        inner.subscriptions.insert(user.to_string(), record);
        inner.append(grant);
        Ok(account)
    }

    async fn clear_subscription(
        &self,
        user: &str,
        audit: TransactionRecord,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let removed = inner.subscriptions.remove(user);
        if removed.is_some() {
            inner.append(audit);
        }
        Ok(removed)
    }

    async fn renew_subscription(&self, renewal: SubscriptionRenewal) -> StoreResult<bool> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let credits = match inner.subscriptions.get(&renewal.user_id) {
            Some(record) if record.renews_on == renewal.expected_renews_on => {
                record.plan.monthly_credits
            }
            _ => return Ok(false),
        };

        inner.credit(&renewal.user_id, credits)?;
        if let Some(record) = inner.subscriptions.get_mut(&renewal.user_id) {
            record.renews_on = renewal.next_renews_on;
        }
        inner.append(renewal.grant);
        Ok(true)
    }

    async fn due_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(UserId, SubscriptionRecord)>> {
        let inner = self.inner.read().await;
        let mut due: Vec<_> = inner
            .subscriptions
            .iter()
            .filter(|(_, record)| record.is_due(now))
            .map(|(user, record)| (user.clone(), record.clone()))
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(due)
    }

    async fn stamp_withdrawal(
        &self,
        user: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
        marker: TransactionRecord,
    ) -> StoreResult<Account> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let account = inner.account_mut(user)?;
        if let Some(ready_at) = withdrawal_ready_at(account.last_withdrawal_at, cooldown) {
            if now < ready_at {
                return Err(StoreError::CooldownActive { ready_at });
            }
        }
        account.last_withdrawal_at = Some(now);
        let account = account.clone();
        inner.append(marker);
        Ok(account)
    }

    async fn transactions(&self, user: &str) -> StoreResult<Vec<TransactionRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .transactions
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn creator_transactions(
        &self,
        creator: &str,
    ) -> StoreResult<Vec<CreatorTransactionRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .sales
            .get(creator)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: ChatMessage) -> StoreResult<()> {
        if self.messages_down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("message store offline".to_string()));
        }
        self.inner.write().await.messages.push(message);
        Ok(())
    }

    async fn messages_for(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>> {
        Ok(self
            .inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.receiver_id == receiver)
            .cloned()
            .collect())
    }
}
