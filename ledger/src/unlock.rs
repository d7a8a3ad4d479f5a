//! Content unlock engine
//!
//! Per (buyer, item) pair the state moves `Locked -> Unlocking -> Unlocked`.
//! `Unlocking` only exists while a purchase is in flight; the purchase itself
//! is committed by the store as one transaction, so a failure at any point
//! leaves the pair `Locked` with nothing charged.

use credit_core::{
    Access, ContentItem, CreatorTransactionRecord, PurchaseCommit, TransactionKind,
    TransactionRecord, UserId,
};
use dashmap::DashSet;
use economics::split_sale;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::EngineContext;
use crate::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Locked,
    Unlocking,
    Unlocked,
}

/// Creator input for a new content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub creator_id: UserId,
    pub title: String,
    pub price: u64,
    #[serde(default)]
    pub images: u32,
    #[serde(default)]
    pub videos: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub content_id: String,
    pub transaction_id: String,
    pub price: u64,
    pub creator_earnings: u64,
    pub platform_fee: u64,
    pub buyer_balance: u64,
}

#[derive(Clone)]
pub struct ContentUnlockEngine {
    ctx: EngineContext,
    in_flight: Arc<DashSet<(UserId, String)>>,
}

/// Clears the in-flight marker however the purchase ends
struct InFlight<'a> {
    set: &'a DashSet<(UserId, String)>,
    key: (UserId, String),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

impl ContentUnlockEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub async fn publish(&self, new: NewContent) -> Result<ContentItem> {
        let policy = self.ctx.policy();

        if new.title.trim().is_empty() {
            return Err(LedgerError::InvalidContent("title is required".to_string()));
        }
        if new.price == 0 {
            return Err(LedgerError::InvalidContent(
                "price must be greater than 0".to_string(),
            ));
        }
        if new.images > policy.max_images {
            return Err(LedgerError::InvalidContent(format!(
                "{} images exceeds the limit of {}",
                new.images, policy.max_images
            )));
        }
        if new.videos > policy.max_videos {
            return Err(LedgerError::InvalidContent(format!(
                "{} videos exceeds the limit of {}",
                new.videos, policy.max_videos
            )));
        }

        let creator = new.creator_id.as_str();
        self.ctx
            .call("account", || self.ctx.store.account(creator))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(new.creator_id.clone()))?;

        let item = ContentItem {
            id: uuid::Uuid::new_v4().to_string(),
            creator_id: new.creator_id,
            title: new.title.trim().to_string(),
            price: new.price,
            images: new.images,
            videos: new.videos,
            created_at: self.ctx.now(),
        };

        self.ctx
            .call("put_content", || self.ctx.store.put_content(item.clone()))
            .await?;

        tracing::info!(
            "published '{}' ({}) by {} at {} credits",
            item.title,
            item.id,
            item.creator_id,
            item.price
        );
        Ok(item)
    }

    pub async fn content(&self, id: &str) -> Result<ContentItem> {
        self.ctx
            .call("content", || self.ctx.store.content(id))
            .await?
            .ok_or_else(|| LedgerError::ContentNotFound(id.to_string()))
    }

    pub async fn is_unlocked(&self, user: &str, content_id: &str) -> Result<bool> {
        self.ctx
            .call("is_unlocked", || self.ctx.store.is_unlocked(user, content_id))
            .await
    }

    /// How `user` may reach the item: creators always see their own content
    pub async fn access(&self, user: &str, content_id: &str) -> Result<Access> {
        let item = self.content(content_id).await?;
        if item.is_owned_by(user) {
            return Ok(Access::Owner);
        }
        if self.is_unlocked(user, content_id).await? {
            Ok(Access::Unlocked)
        } else {
            Ok(Access::Locked)
        }
    }

    pub async fn state(&self, user: &str, content_id: &str) -> Result<UnlockState> {
        if self
            .in_flight
            .contains(&(user.to_string(), content_id.to_string()))
        {
            return Ok(UnlockState::Unlocking);
        }
        if self.is_unlocked(user, content_id).await? {
            Ok(UnlockState::Unlocked)
        } else {
            Ok(UnlockState::Locked)
        }
    }

    pub async fn purchase(&self, buyer: &str, content_id: &str) -> Result<PurchaseReceipt> {
        let item = self.content(content_id).await?;

        if item.is_owned_by(buyer) {
            tracing::warn!("{} tried to buy their own content {}", buyer, content_id);
            return Err(LedgerError::SelfPurchaseForbidden);
        }
        if self.is_unlocked(buyer, content_id).await? {
            tracing::debug!("{} already unlocked {}", buyer, content_id);
            return Err(LedgerError::AlreadyUnlocked(content_id.to_string()));
        }

        let account = self
            .ctx
            .call("account", || self.ctx.store.account(buyer))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(buyer.to_string()))?;
        if !account.can_afford(item.price) {
            tracing::warn!(
                "{} cannot afford {} ({} < {})",
                buyer,
                content_id,
                account.spendable_balance,
                item.price
            );
            return Err(LedgerError::InsufficientFunds {
                available: account.spendable_balance,
                required: item.price,
            });
        }

        let key = (buyer.to_string(), content_id.to_string());
        self.in_flight.insert(key.clone());
        let _guard = InFlight {
            set: &self.in_flight,
            key,
        };

        let split = split_sale(item.price, self.ctx.policy().commission_ppb());
        let now = self.ctx.now();
        let buyer_record = TransactionRecord::debit(
            buyer,
            TransactionKind::ContentPurchaseDebit,
            item.price,
            format!("Unlocked content: {}", item.title),
            now,
        );
        let transaction_id = buyer_record.id.clone();
        let commit = PurchaseCommit {
            buyer_id: buyer.to_string(),
            creator_id: item.creator_id.clone(),
            content_id: item.id.clone(),
            price: item.price,
            earnings: split.creator_earnings,
            buyer_record,
            sale_record: CreatorTransactionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                creator_id: item.creator_id.clone(),
                content_id: item.id.clone(),
                content_title: item.title.clone(),
                buyer_id: buyer.to_string(),
                amount_received: split.creator_earnings,
                list_price: item.price,
                timestamp: now,
            },
        };

        let account = self
            .ctx
            .call("commit_purchase", || {
                self.ctx.store.commit_purchase(commit.clone())
            })
            .await?;

        tracing::info!(
            "{} unlocked {} for {} credits ({} to {}, {} retained)",
            buyer,
            item.id,
            item.price,
            split.creator_earnings,
            item.creator_id,
            split.platform_fee
        );

        Ok(PurchaseReceipt {
            content_id: item.id,
            transaction_id,
            price: item.price,
            creator_earnings: split.creator_earnings,
            platform_fee: split.platform_fee,
            buyer_balance: account.spendable_balance,
        })
    }
}
