//! Storage seam consumed by the engines
//!
//! Every mutating method is a single atomic conditional update: the
//! precondition is checked and the mutation applied under the same lock or
//! transaction. A rejected precondition leaves the store untouched.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::{
    Account, ChatMessage, ContentId, ContentItem, CreatorTransactionRecord, StoreResult,
    SubscriptionRecord, TransactionRecord, UserId,
};

/// Everything a content purchase writes, committed as one unit.
#[derive(Debug, Clone)]
pub struct PurchaseCommit {
    pub buyer_id: UserId,
    pub creator_id: UserId,
    pub content_id: ContentId,
    pub price: u64,
    pub earnings: u64,
    pub buyer_record: TransactionRecord,
    pub sale_record: CreatorTransactionRecord,
}

/// A renewal grant guarded by the renewal date it was computed from.
#[derive(Debug, Clone)]
pub struct SubscriptionRenewal {
    pub user_id: UserId,
    pub expected_renews_on: DateTime<Utc>,
    pub next_renews_on: DateTime<Utc>,
    pub grant: TransactionRecord,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the account if missing; returns the stored account either way
    async fn open_account(&self, user: &str, now: DateTime<Utc>) -> StoreResult<Account>;

    async fn account(&self, user: &str) -> StoreResult<Option<Account>>;

    /// Add `amount` to the spendable balance and append `record`
    async fn apply_credit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account>;

    /// Subtract `amount` only if the spendable balance covers it
    async fn apply_debit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account>;

    /// Debit buyer, credit creator's earned balance, record both sides and
    /// insert the unlock. Fails with `AlreadyUnlocked` or `InsufficientFunds`
    /// without writing anything. Returns the buyer's account after commit.
    async fn commit_purchase(&self, commit: PurchaseCommit) -> StoreResult<Account>;

    async fn unlocked(&self, user: &str) -> StoreResult<HashSet<ContentId>>;

    async fn is_unlocked(&self, user: &str, content: &str) -> StoreResult<bool>;

    async fn put_content(&self, item: ContentItem) -> StoreResult<()>;

    async fn content(&self, id: &str) -> StoreResult<Option<ContentItem>>;

    async fn subscription(&self, user: &str) -> StoreResult<Option<SubscriptionRecord>>;

    /// Replace the user's subscription and credit the plan grant
    async fn apply_subscription(
        &self,
        user: &str,
        record: SubscriptionRecord,
        grant: TransactionRecord,
    ) -> StoreResult<Account>;

    /// Clear the subscription, appending `audit`. Returns the removed record,
    /// or `None` (and writes nothing) if there was none.
    async fn clear_subscription(
        &self,
        user: &str,
        audit: TransactionRecord,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Apply a renewal only if the stored `renews_on` still equals
    /// `expected_renews_on`. Returns whether the grant was applied.
    async fn renew_subscription(&self, renewal: SubscriptionRenewal) -> StoreResult<bool>;

    async fn due_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(UserId, SubscriptionRecord)>>;

    /// Stamp `last_withdrawal_at = now` if the cooldown has elapsed,
    /// otherwise fail with `CooldownActive` and write nothing.
    async fn stamp_withdrawal(
        &self,
        user: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
        marker: TransactionRecord,
    ) -> StoreResult<Account>;

    /// Transaction log for one account, oldest first
    async fn transactions(&self, user: &str) -> StoreResult<Vec<TransactionRecord>>;

    /// Sales credited to one creator, oldest first
    async fn creator_transactions(
        &self,
        creator: &str,
    ) -> StoreResult<Vec<CreatorTransactionRecord>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: ChatMessage) -> StoreResult<()>;

    /// Messages addressed to `receiver`, oldest first
    async fn messages_for(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>>;
}

/// Cooldown check shared by store backends
pub fn withdrawal_ready_at(
    last_withdrawal_at: Option<DateTime<Utc>>,
    cooldown: Duration,
) -> Option<DateTime<Utc>> {
    last_withdrawal_at.map(|last| {
        last.checked_add_signed(cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}
