//! Transaction log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    ContentPurchaseDebit,
    RewardCredit,
    SubscriptionCredit,
    SubscriptionCancel,
    ChatDebit,
    ChatRefund,
    AdminGrant,
    TopUp,
    WithdrawalMarker,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::ContentPurchaseDebit => "content_purchase_debit",
            TransactionKind::RewardCredit => "reward_credit",
            TransactionKind::SubscriptionCredit => "subscription_credit",
            TransactionKind::SubscriptionCancel => "subscription_cancel",
            TransactionKind::ChatDebit => "chat_debit",
            TransactionKind::ChatRefund => "chat_refund",
            TransactionKind::AdminGrant => "admin_grant",
            TransactionKind::TopUp => "top_up",
            TransactionKind::WithdrawalMarker => "withdrawal_marker",
        };
        f.write_str(name)
    }
}

/// Immutable entry in a user's transaction log.
///
/// `amount` is signed: credits are positive, debits negative, and audit
/// markers (cancellations, withdrawal requests) carry zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: UserId,
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        account_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: i64,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            kind,
            amount,
            description: description.into(),
            timestamp,
        }
    }

    pub fn credit(
        account_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: u64,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, kind, signed(amount), description, timestamp)
    }

    pub fn debit(
        account_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: u64,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, kind, -signed(amount), description, timestamp)
    }

    pub fn marker(
        account_id: impl Into<UserId>,
        kind: TransactionKind,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, kind, 0, description, timestamp)
    }
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// A content sale seen from the seller's side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorTransactionRecord {
    pub id: String,
    pub creator_id: UserId,
    pub content_id: ContentId,
    pub content_title: String,
    pub buyer_id: UserId,
    /// Post-commission amount credited to the creator's earned balance
    pub amount_received: u64,
    pub list_price: u64,
    pub timestamp: DateTime<Utc>,
}
