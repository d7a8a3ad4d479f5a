//! Credit Economy Core Library
//!
//! Shared records and the storage seam for the credit economy:
//! - Accounts with spendable and earned balances
//! - Append-only transaction and creator-sale logs
//! - Content items, unlocked sets and subscription records
//! - The `LedgerStore` / `MessageStore` traits plus in-memory and sled backends

pub mod account;
pub mod clock;
pub mod content;
pub mod db;
pub mod error;
pub mod memory;
pub mod message;
pub mod store;
pub mod subscription;
pub mod transaction;

pub use account::Account;
pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{Access, ContentItem};
pub use db::SledStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use message::{ChatMessage, GUEST_SENDER_ID};
pub use store::{LedgerStore, MessageStore, PurchaseCommit, SubscriptionRenewal};
pub use subscription::{Plan, SubscriptionRecord};
pub use transaction::{CreatorTransactionRecord, TransactionKind, TransactionRecord};

/// Identifier of an authenticated user account
pub type UserId = String;

/// Identifier of a content item
pub type ContentId = String;
