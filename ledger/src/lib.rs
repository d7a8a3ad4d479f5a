//! Credit Economy Ledger
//!
//! The engines that move credits:
//! - Balance ledger (credits, debits, top-ups, history)
//! - Content publishing and one-time unlocks with the commission split
//! - Rewarded-ad grants
//! - Subscriptions with monthly renewals
//! - Metered chat for members and guests
//! - Creator withdrawal requests behind a cooldown
//!
//! All engines share one `LedgerStore`; balance changes only ever happen
//! inside a single store call.

pub mod balance;
pub mod chat;
pub mod context;
pub mod error;
pub mod provider;
pub mod retry;
pub mod reward;
pub mod service;
pub mod subscription;
pub mod unlock;
pub mod withdrawal;

pub use balance::BalanceLedger;
pub use chat::{ChatMeter, GuestCreditPool, Payer, SentMessage};
pub use context::EngineContext;
pub use error::{LedgerError, Result};
pub use provider::{ManualBilling, PaymentProvider, ProviderError};
pub use retry::RetryPolicy;
pub use reward::RewardEngine;
pub use service::{Economy, EconomyBuilder};
pub use subscription::{RenewalReport, SubscriptionEngine, SubscriptionReceipt};
pub use unlock::{ContentUnlockEngine, NewContent, PurchaseReceipt, UnlockState};
pub use withdrawal::{is_withdrawal_ready, WithdrawalGate, WithdrawalStatus, WithdrawalTicket};
