//! Sled-based persistence for ledger data
//!
//! Each conditional update runs inside one multi-tree sled transaction, so a
//! purchase either lands in every tree or in none of them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use std::collections::HashSet;
use std::path::Path;

use crate::store::withdrawal_ready_at;
use crate::{
    Account, ChatMessage, ContentId, ContentItem, CreatorTransactionRecord, LedgerStore,
    MessageStore, PurchaseCommit, StoreError, StoreResult, SubscriptionRecord,
    SubscriptionRenewal, TransactionRecord, UserId,
};

const SEP: u8 = 0;

#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    accounts: sled::Tree,
    log: sled::Tree,
    sales: sled::Tree,
    unlocks: sled::Tree,
    content: sled::Tree,
    subscriptions: sled::Tree,
    messages: sled::Tree,
    path: String,
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = sled::open(&path)
            .map_err(|e| StoreError::Backend(format!("Failed to open database: {}", e)))?;

        tracing::debug!("opened sled store at {}", path_str);

        Ok(SledStore {
            accounts: db.open_tree("accounts")?,
            log: db.open_tree("transactions")?,
            sales: db.open_tree("creator_transactions")?,
            unlocks: db.open_tree("unlocks")?,
            content: db.open_tree("content")?,
            subscriptions: db.open_tree("subscriptions")?,
            messages: db.open_tree("messages")?,
            db,
            path: path_str,
        })
    }

    /// Get the database path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn next_key(&self, owner: &str) -> StoreResult<Vec<u8>> {
        let seq = self.db.generate_id()?;
        Ok(scoped_key(owner, &seq.to_be_bytes()))
    }

    /// Run sled I/O on the blocking pool so callers' timeouts stay effective.
    /// A timed-out caller does not cancel the write.
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&SledStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("storage task failed: {}", e)))?
    }

    /// Flush to disk so committed balances survive a restart
    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(tree: &sled::Tree, owner: &str) -> StoreResult<Vec<T>> {
        tree.scan_prefix(scoped_key(owner, &[]))
            .values()
            .map(|raw| -> StoreResult<T> { Ok(bincode::deserialize(&raw?)?) })
            .collect()
    }

    fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> StoreResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}

fn scoped_key(owner: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + 1 + suffix.len());
    key.extend_from_slice(owner.as_bytes());
    key.push(SEP);
    key.extend_from_slice(suffix);
    key
}

fn abort(e: impl Into<StoreError>) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(e.into())
}

fn tx_get<T: DeserializeOwned>(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<Option<T>, StoreError> {
    match tree.get(key)? {
        Some(raw) => bincode::deserialize(&raw).map(Some).map_err(abort),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> ConflictableTransactionResult<(), StoreError> {
    let bytes = bincode::serialize(value).map_err(abort)?;
    tree.insert(key, bytes)?;
    Ok(())
}

fn tx_account(
    tree: &TransactionalTree,
    user: &str,
) -> ConflictableTransactionResult<Account, StoreError> {
    tx_get(tree, user.as_bytes())?.ok_or_else(|| abort(StoreError::AccountNotFound(user.to_string())))
}

fn finish<T>(result: Result<T, TransactionError<StoreError>>) -> StoreResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    })
}

// Blocking bodies of the store traits, run through `blocking`
impl SledStore {
    fn open_account_blocking(&self, user: &str, now: DateTime<Utc>) -> StoreResult<Account> {
        let account = finish(self.accounts.transaction(|accounts| {
            match tx_get::<Account>(accounts, user.as_bytes())? {
                Some(existing) => Ok(existing),
                None => {
                    let created = Account::new(user, now);
                    tx_put(accounts, user.as_bytes(), &created)?;
                    Ok(created)
                }
            }
        }))?;
        self.flush()?;
        Ok(account)
    }

    fn account_blocking(&self, user: &str) -> StoreResult<Option<Account>> {
        Self::get(&self.accounts, user)
    }

    fn apply_credit_blocking(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        let log_key = self.next_key(user)?;
        let account = finish((&self.accounts, &self.log).transaction(|(accounts, log)| {
            let mut account = tx_account(accounts, user)?;
            account.spendable_balance = account
                .spendable_balance
                .checked_add(amount)
                .ok_or_else(|| abort(StoreError::Overflow(user.to_string())))?;
            tx_put(accounts, user.as_bytes(), &account)?;
            tx_put(log, &log_key, &record)?;
            Ok(account)
        }))?;
        self.flush()?;
        Ok(account)
    }

    fn apply_debit_blocking(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        let log_key = self.next_key(user)?;
        let account = finish((&self.accounts, &self.log).transaction(|(accounts, log)| {
            let mut account = tx_account(accounts, user)?;
            if account.spendable_balance < amount {
                return Err(abort(StoreError::InsufficientFunds {
                    available: account.spendable_balance,
                    required: amount,
                }));
            }
            account.spendable_balance -= amount;
            tx_put(accounts, user.as_bytes(), &account)?;
            tx_put(log, &log_key, &record)?;
            Ok(account)
        }))?;
        self.flush()?;
        Ok(account)
    }

    fn commit_purchase_blocking(&self, commit: PurchaseCommit) -> StoreResult<Account> {
        let log_key = self.next_key(&commit.buyer_id)?;
        let sale_key = self.next_key(&commit.creator_id)?;
        let unlock_key = scoped_key(&commit.buyer_id, commit.content_id.as_bytes());

        let buyer = finish(
            (&self.accounts, &self.log, &self.sales, &self.unlocks).transaction(
                |(accounts, log, sales, unlocks)| {
                    if unlocks.get(unlock_key.as_slice())?.is_some() {
                        return Err(abort(StoreError::AlreadyUnlocked(commit.content_id.clone())));
                    }

                    let mut creator = tx_account(accounts, &commit.creator_id)?;
                    creator.earned_balance = creator
                        .earned_balance
                        .checked_add(commit.earnings)
                        .ok_or_else(|| abort(StoreError::Overflow(commit.creator_id.clone())))?;

                    let mut buyer = tx_account(accounts, &commit.buyer_id)?;
                    if buyer.spendable_balance < commit.price {
                        return Err(abort(StoreError::InsufficientFunds {
                            available: buyer.spendable_balance,
                            required: commit.price,
                        }));
                    }
                    buyer.spendable_balance -= commit.price;

                    tx_put(accounts, commit.buyer_id.as_bytes(), &buyer)?;
                    tx_put(accounts, commit.creator_id.as_bytes(), &creator)?;
                    tx_put(log, &log_key, &commit.buyer_record)?;
                    tx_put(sales, &sale_key, &commit.sale_record)?;
                    unlocks.insert(unlock_key.as_slice(), &[] as &[u8])?;
                    Ok(buyer)
                },
            ),
        )?;
        self.flush()?;
        Ok(buyer)
    }

    fn unlocked_blocking(&self, user: &str) -> StoreResult<HashSet<ContentId>> {
        let prefix = scoped_key(user, &[]);
        self.unlocks
            .scan_prefix(&prefix)
            .keys()
            .map(|key| -> StoreResult<ContentId> {
                let key = key?;
                Ok(String::from_utf8_lossy(&key[prefix.len()..]).into_owned())
            })
            .collect()
    }

    fn is_unlocked_blocking(&self, user: &str, content: &str) -> StoreResult<bool> {
        Ok(self
            .unlocks
            .contains_key(scoped_key(user, content.as_bytes()))?)
    }

    fn put_content_blocking(&self, item: ContentItem) -> StoreResult<()> {
        let bytes = bincode::serialize(&item)?;
        self.content.insert(item.id.as_bytes(), bytes)?;
        self.flush()
    }

    fn content_blocking(&self, id: &str) -> StoreResult<Option<ContentItem>> {
        Self::get(&self.content, id)
    }

    fn subscription_blocking(&self, user: &str) -> StoreResult<Option<SubscriptionRecord>> {
        Self::get(&self.subscriptions, user)
    }

    fn apply_subscription_blocking(
        &self,
        user: &str,
        record: SubscriptionRecord,
        grant: TransactionRecord,
    ) -> StoreResult<Account> {
        let log_key = self.next_key(user)?;
        let account = finish(
            (&self.accounts, &self.log, &self.subscriptions).transaction(
                |(accounts, log, subscriptions)| {
                    let mut account = tx_account(accounts, user)?;
                    account.spendable_balance = account
                        .spendable_balance
                        .checked_add(record.plan.monthly_credits)
                        .ok_or_else(|| abort(StoreError::Overflow(user.to_string())))?;
                    tx_put(accounts, user.as_bytes(), &account)?;
                    tx_put(subscriptions, user.as_bytes(), &record)?;
                    tx_put(log, &log_key, &grant)?;
                    Ok(account)
                },
            ),
        )?;
        self.flush()?;
        Ok(account)
    }

    fn clear_subscription_blocking(
        &self,
        user: &str,
        audit: TransactionRecord,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let log_key = self.next_key(user)?;
        let removed = finish((&self.log, &self.subscriptions).transaction(|(log, subscriptions)| {
            let removed = tx_get::<SubscriptionRecord>(subscriptions, user.as_bytes())?;
            if removed.is_some() {
                subscriptions.remove(user.as_bytes())?;
                tx_put(log, &log_key, &audit)?;
            }
            Ok(removed)
        }))?;
        self.flush()?;
        Ok(removed)
    }

    fn renew_subscription_blocking(&self, renewal: SubscriptionRenewal) -> StoreResult<bool> {
        let user = renewal.user_id.as_str();
        let log_key = self.next_key(user)?;
        let applied = finish(
            (&self.accounts, &self.log, &self.subscriptions).transaction(
                |(accounts, log, subscriptions)| {
                    let mut record =
                        match tx_get::<SubscriptionRecord>(subscriptions, user.as_bytes())? {
                            Some(record) if record.renews_on == renewal.expected_renews_on => {
                                record
                            }
                            _ => return Ok(false),
                        };

                    let mut account = tx_account(accounts, user)?;
                    account.spendable_balance = account
                        .spendable_balance
                        .checked_add(record.plan.monthly_credits)
                        .ok_or_else(|| abort(StoreError::Overflow(user.to_string())))?;
                    record.renews_on = renewal.next_renews_on;

                    tx_put(accounts, user.as_bytes(), &account)?;
                    tx_put(subscriptions, user.as_bytes(), &record)?;
                    tx_put(log, &log_key, &renewal.grant)?;
                    Ok(true)
                },
            ),
        )?;
        self.flush()?;
        Ok(applied)
    }

    fn due_subscriptions_blocking(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(UserId, SubscriptionRecord)>> {
        let mut due = Vec::new();
        for entry in self.subscriptions.iter() {
            let (key, raw) = entry?;
            let record: SubscriptionRecord = bincode::deserialize(&raw)?;
            if record.is_due(now) {
                due.push((String::from_utf8_lossy(&key).into_owned(), record));
            }
        }
        Ok(due)
    }

    fn stamp_withdrawal_blocking(
        &self,
        user: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
        marker: TransactionRecord,
    ) -> StoreResult<Account> {
        let log_key = self.next_key(user)?;
        let account = finish((&self.accounts, &self.log).transaction(|(accounts, log)| {
            let mut account = tx_account(accounts, user)?;
            if let Some(ready_at) = withdrawal_ready_at(account.last_withdrawal_at, cooldown) {
                if now < ready_at {
                    return Err(abort(StoreError::CooldownActive { ready_at }));
                }
            }
            account.last_withdrawal_at = Some(now);
            tx_put(accounts, user.as_bytes(), &account)?;
            tx_put(log, &log_key, &marker)?;
            Ok(account)
        }))?;
        self.flush()?;
        Ok(account)
    }

    fn transactions_blocking(&self, user: &str) -> StoreResult<Vec<TransactionRecord>> {
        Self::scan(&self.log, user)
    }

    fn creator_transactions_blocking(
        &self,
        creator: &str,
    ) -> StoreResult<Vec<CreatorTransactionRecord>> {
        Self::scan(&self.sales, creator)
    }

    fn insert_message_blocking(&self, message: ChatMessage) -> StoreResult<()> {
        let key = self.next_key(&message.receiver_id)?;
        let bytes = bincode::serialize(&message)?;
        self.messages.insert(key, bytes)?;
        self.flush()
    }

    fn messages_for_blocking(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>> {
        Self::scan(&self.messages, receiver)
    }
}

#[async_trait]
impl LedgerStore for SledStore {
    async fn open_account(&self, user: &str, now: DateTime<Utc>) -> StoreResult<Account> {
        let user = user.to_string();
        self.blocking(move |db| db.open_account_blocking(&user, now))
            .await
    }

    async fn account(&self, user: &str) -> StoreResult<Option<Account>> {
        let user = user.to_string();
        self.blocking(move |db| db.account_blocking(&user)).await
    }

    async fn apply_credit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        let user = user.to_string();
        self.blocking(move |db| db.apply_credit_blocking(&user, amount, record))
            .await
    }

    async fn apply_debit(
        &self,
        user: &str,
        amount: u64,
        record: TransactionRecord,
    ) -> StoreResult<Account> {
        let user = user.to_string();
        self.blocking(move |db| db.apply_debit_blocking(&user, amount, record))
            .await
    }

    async fn commit_purchase(&self, commit: PurchaseCommit) -> StoreResult<Account> {
        self.blocking(move |db| db.commit_purchase_blocking(commit))
            .await
    }

    async fn unlocked(&self, user: &str) -> StoreResult<HashSet<ContentId>> {
        let user = user.to_string();
        self.blocking(move |db| db.unlocked_blocking(&user)).await
    }

    async fn is_unlocked(&self, user: &str, content: &str) -> StoreResult<bool> {
        let user = user.to_string();
        let content = content.to_string();
        self.blocking(move |db| db.is_unlocked_blocking(&user, &content))
            .await
    }

    async fn put_content(&self, item: ContentItem) -> StoreResult<()> {
        self.blocking(move |db| db.put_content_blocking(item)).await
    }

    async fn content(&self, id: &str) -> StoreResult<Option<ContentItem>> {
        let id = id.to_string();
        self.blocking(move |db| db.content_blocking(&id)).await
    }

    async fn subscription(&self, user: &str) -> StoreResult<Option<SubscriptionRecord>> {
        let user = user.to_string();
        self.blocking(move |db| db.subscription_blocking(&user)).await
    }

    async fn apply_subscription(
        &self,
        user: &str,
        record: SubscriptionRecord,
        grant: TransactionRecord,
    ) -> StoreResult<Account> {
        let user = user.to_string();
        self.blocking(move |db| db.apply_subscription_blocking(&user, record, grant))
            .await
    }

    async fn clear_subscription(
        &self,
        user: &str,
        audit: TransactionRecord,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let user = user.to_string();
        self.blocking(move |db| db.clear_subscription_blocking(&user, audit))
            .await
    }

    async fn renew_subscription(&self, renewal: SubscriptionRenewal) -> StoreResult<bool> {
        self.blocking(move |db| db.renew_subscription_blocking(renewal))
            .await
    }

    async fn due_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(UserId, SubscriptionRecord)>> {
        self.blocking(move |db| db.due_subscriptions_blocking(now))
            .await
    }

    async fn stamp_withdrawal(
        &self,
        user: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
        marker: TransactionRecord,
    ) -> StoreResult<Account> {
        let user = user.to_string();
        self.blocking(move |db| db.stamp_withdrawal_blocking(&user, now, cooldown, marker))
            .await
    }

    async fn transactions(&self, user: &str) -> StoreResult<Vec<TransactionRecord>> {
        let user = user.to_string();
        self.blocking(move |db| db.transactions_blocking(&user)).await
    }

    async fn creator_transactions(
        &self,
        creator: &str,
    ) -> StoreResult<Vec<CreatorTransactionRecord>> {
        let creator = creator.to_string();
        self.blocking(move |db| db.creator_transactions_blocking(&creator))
            .await
    }
}

#[async_trait]
impl MessageStore for SledStore {
    async fn insert_message(&self, message: ChatMessage) -> StoreResult<()> {
        self.blocking(move |db| db.insert_message_blocking(message))
            .await
    }

    async fn messages_for(&self, receiver: &str) -> StoreResult<Vec<ChatMessage>> {
        let receiver = receiver.to_string();
        self.blocking(move |db| db.messages_for_blocking(&receiver))
            .await
    }
}
