//! Chat message rows handed to the message store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Sender id recorded for unauthenticated visitors
pub const GUEST_SENDER_ID: &str = "guest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub cost: u64,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        sender_id: impl Into<UserId>,
        receiver_id: impl Into<UserId>,
        text: impl Into<String>,
        cost: u64,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            text: text.into(),
            cost,
            sent_at,
        }
    }

    pub fn is_from_guest(&self) -> bool {
        self.sender_id == GUEST_SENDER_ID
    }
}
