//! Paid content items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub creator_id: UserId,
    pub title: String,
    /// List price in credits, always positive
    pub price: u64,
    pub images: u32,
    pub videos: u32,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.creator_id == user
    }
}

/// How a user may reach a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Owner,
    Unlocked,
    Locked,
}
