//! Account balances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Per-user balance state, owned by the ledger store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    /// Credits the user can spend on unlocks and messages
    pub spendable_balance: u64,
    /// Creator earnings pending withdrawal
    pub earned_balance: u64,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            spendable_balance: 0,
            earned_balance: 0,
            last_withdrawal_at: None,
            created_at,
        }
    }

    pub fn can_afford(&self, amount: u64) -> bool {
        self.spendable_balance >= amount
    }
}
