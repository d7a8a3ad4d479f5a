//! Store error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by `LedgerStore` and `MessageStore` implementations.
///
/// The first group are outcomes of conditional updates: the store refused the
/// mutation and nothing was written. `Unavailable` is transient and may be
/// retried; `Backend` and `Serialization` are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Content already unlocked: {0}")]
    AlreadyUnlocked(String),

    #[error("Withdrawal cooldown active until {ready_at}")]
    CooldownActive { ready_at: DateTime<Utc> },

    #[error("Balance overflow for account {0}")]
    Overflow(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
