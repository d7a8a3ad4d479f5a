//! Economy policy configuration
//!
//! The policy is owned by an admin surface. Engines only ever read a
//! snapshot through [`PolicyHandle`]; replacing the policy validates it first.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::constants::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Commission must be in [0, 1): got {0}")]
    InvalidCommission(f64),

    #[error("Credit rate must be a non-negative number: got {0}")]
    InvalidCreditRate(f64),

    #[error("Reward credits must be positive")]
    InvalidRewardCredits,

    #[error("Failed to parse policy: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyPolicy {
    /// Fraction of each sale retained by the platform
    pub commission: f64,
    /// Currency units per credit, used to value payouts
    pub credit_rate: f64,
    pub withdrawal_cooldown_hours: u64,
    pub chat_rate_per_1000_chars: u64,
    pub max_images: u32,
    pub max_videos: u32,
    pub reward_credits: u64,
    /// Per-user reward cooldown; 0 disables it
    pub reward_cooldown_secs: u64,
}

impl Default for EconomyPolicy {
    fn default() -> Self {
        Self {
            commission: DEFAULT_COMMISSION,
            credit_rate: DEFAULT_CREDIT_RATE,
            withdrawal_cooldown_hours: DEFAULT_WITHDRAWAL_COOLDOWN_HOURS,
            chat_rate_per_1000_chars: DEFAULT_CHAT_RATE_PER_1000_CHARS,
            max_images: DEFAULT_MAX_IMAGES,
            max_videos: DEFAULT_MAX_VIDEOS,
            reward_credits: REWARD_CREDITS,
            reward_cooldown_secs: 0,
        }
    }
}

impl EconomyPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.commission.is_finite() || !(0.0..1.0).contains(&self.commission) {
            return Err(PolicyError::InvalidCommission(self.commission));
        }
        if !self.credit_rate.is_finite() || self.credit_rate < 0.0 {
            return Err(PolicyError::InvalidCreditRate(self.credit_rate));
        }
        if self.reward_credits == 0 {
            return Err(PolicyError::InvalidRewardCredits);
        }
        Ok(())
    }

    /// Parse and validate a policy from a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(raw).map_err(|e| PolicyError::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Commission in parts per billion, the resolution `split_sale` works at
    pub fn commission_ppb(&self) -> u64 {
        (self.commission * COMMISSION_SCALE as f64).round() as u64
    }

    pub fn withdrawal_cooldown(&self) -> Duration {
        Duration::from_secs(self.withdrawal_cooldown_hours.saturating_mul(3600))
    }

    pub fn reward_cooldown(&self) -> Option<Duration> {
        (self.reward_cooldown_secs > 0).then(|| Duration::from_secs(self.reward_cooldown_secs))
    }
}

/// Shared read-mostly access to the current policy
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<EconomyPolicy>>,
}

impl PolicyHandle {
    pub fn new(policy: EconomyPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(policy)),
        })
    }

    pub fn snapshot(&self) -> EconomyPolicy {
        *self.inner.read()
    }

    /// Swap in a new policy; the old one stays active if validation fails
    pub fn replace(&self, policy: EconomyPolicy) -> Result<EconomyPolicy, PolicyError> {
        policy.validate()?;
        let mut current = self.inner.write();
        Ok(std::mem::replace(&mut *current, policy))
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EconomyPolicy::default())),
        }
    }
}
