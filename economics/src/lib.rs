//! Credit Economy Economics Module
//!
//! Pure arithmetic and configuration for the credit economy:
//! - Economy policy (commission, exchange rate, cooldowns, chat rate, media limits)
//! - Commission split between creator and platform
//! - Chat metering and payout pricing

pub mod policy;
pub mod pricing;
pub mod split;

pub use policy::{EconomyPolicy, PolicyError, PolicyHandle};
pub use pricing::{PayoutQuote, PriceCalculator};
pub use split::{split_sale, CommissionSplit};

/// Economic constants
pub mod constants {
    /// Fixed-point resolution of the commission rate (parts per billion)
    pub const COMMISSION_SCALE: u64 = 1_000_000_000;

    /// Characters per chat pricing bucket
    pub const CHAT_CHARS_PER_BUCKET: u64 = 1_000;

    /// Platform commission on content sales (50%)
    pub const DEFAULT_COMMISSION: f64 = 0.50;

    /// Currency value of one credit
    pub const DEFAULT_CREDIT_RATE: f64 = 0.10;

    /// Minimum time between withdrawal requests
    pub const DEFAULT_WITHDRAWAL_COOLDOWN_HOURS: u64 = 24;

    /// Credits charged per 1000 chat characters
    pub const DEFAULT_CHAT_RATE_PER_1000_CHARS: u64 = 50;

    pub const DEFAULT_MAX_IMAGES: u32 = 10;
    pub const DEFAULT_MAX_VIDEOS: u32 = 3;

    /// Credits granted per rewarded ad
    pub const REWARD_CREDITS: u64 = 10;

    /// Starting balance of an unauthenticated chat session
    pub const GUEST_STARTING_CREDITS: u64 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_constants() {
        assert_eq!(constants::COMMISSION_SCALE, 1_000_000_000);
        assert_eq!(constants::CHAT_CHARS_PER_BUCKET, 1_000);
        assert!(constants::DEFAULT_COMMISSION < 1.0);
    }
}
