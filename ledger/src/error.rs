//! Ledger error types

use chrono::{DateTime, Utc};
use credit_core::StoreError;
use economics::PolicyError;
use std::time::Duration;
use thiserror::Error;

/// Engine errors
///
/// Validation failures (funds, ownership, cooldowns) are raised before any
/// mutation and are always safe to retry once the condition changes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Guest credits exhausted: have {available}, need {required}. Create an account to keep chatting")]
    GuestCreditsExhausted { available: u64, required: u64 },

    #[error("Creators cannot purchase their own content")]
    SelfPurchaseForbidden,

    #[error("Content already unlocked: {0}")]
    AlreadyUnlocked(String),

    #[error("Withdrawal cooldown active: {}s remaining", remaining.as_secs())]
    CooldownActive {
        remaining: Duration,
        ready_at: DateTime<Utc>,
    },

    #[error("Reward cooldown active: {}s remaining", remaining.as_secs())]
    RewardCooldown { remaining: Duration },

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Store call timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Payment provider call failed: {0}")]
    ProviderCallFailed(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl LedgerError {
    /// Credits missing for the rejected charge
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            LedgerError::InsufficientFunds {
                available,
                required,
            }
            | LedgerError::GuestCreditsExhausted {
                available,
                required,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }

    pub fn cooldown(ready_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        LedgerError::CooldownActive {
            remaining: (ready_at - now).to_std().unwrap_or_default(),
            ready_at,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::ContentNotFound(id) => LedgerError::ContentNotFound(id),
            StoreError::InsufficientFunds {
                available,
                required,
            } => LedgerError::InsufficientFunds {
                available,
                required,
            },
            StoreError::AlreadyUnlocked(id) => LedgerError::AlreadyUnlocked(id),
            StoreError::CooldownActive { ready_at } => LedgerError::cooldown(ready_at, Utc::now()),
            StoreError::Overflow(id) => {
                LedgerError::InvalidAmount(format!("balance overflow for {}", id))
            }
            StoreError::Unavailable(msg)
            | StoreError::Backend(msg)
            | StoreError::Serialization(msg) => LedgerError::StoreWriteFailed(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
