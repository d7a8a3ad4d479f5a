//! Rewarded-ad credit grants

use chrono::{DateTime, Utc};
use credit_core::{Account, TransactionKind, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::balance::BalanceLedger;
use crate::context::EngineContext;
use crate::{LedgerError, Result};

/// Grants a fixed credit amount after a simulated ad view.
///
/// When the policy sets a reward cooldown, each user gets at most one grant
/// per window. The slot is reserved before the delay so concurrent requests
/// from one user cannot both pass.
#[derive(Clone)]
pub struct RewardEngine {
    ctx: EngineContext,
    ledger: BalanceLedger,
    delay: Duration,
    last_grant: Arc<DashMap<UserId, DateTime<Utc>>>,
}

impl RewardEngine {
    pub fn new(ctx: EngineContext, ledger: BalanceLedger, delay: Duration) -> Self {
        Self {
            ctx,
            ledger,
            delay,
            last_grant: Arc::new(DashMap::new()),
        }
    }

    pub async fn grant_reward(&self, user: &str) -> Result<Account> {
        let policy = self.ctx.policy();
        let now = self.ctx.now();
        let previous = self.reserve(user, now, policy.reward_cooldown())?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = self
            .ledger
            .credit(
                user,
                policy.reward_credits,
                "Reward for watching an ad",
                TransactionKind::RewardCredit,
            )
            .await;

        if result.is_err() {
            self.release(user, previous);
        }
        result
    }

    fn reserve(
        &self,
        user: &str,
        now: DateTime<Utc>,
        cooldown: Option<Duration>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(cooldown) = cooldown else {
            if !self.last_grant.is_empty() {
                self.last_grant.clear();
            }
            return Ok(None);
        };
        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        self.prune(now, cooldown);

        match self.last_grant.entry(user.to_string()) {
            Entry::Occupied(mut slot) => {
                let ready_at = slot
                    .get()
                    .checked_add_signed(cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if now < ready_at {
                    let remaining = (ready_at - now).to_std().unwrap_or_default();
                    tracing::warn!("reward for {} on cooldown for {:?}", user, remaining);
                    return Err(LedgerError::RewardCooldown { remaining });
                }
                Ok(Some(slot.insert(now)))
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                Ok(None)
            }
        }
    }

    /// Forget users whose cooldown has run out
    fn prune(&self, now: DateTime<Utc>, cooldown: chrono::Duration) {
        self.last_grant.retain(|_, at| match at.checked_add_signed(cooldown) {
            Some(ready_at) => now < ready_at,
            None => true,
        });
    }

    fn release(&self, user: &str, previous: Option<DateTime<Utc>>) {
        match previous {
            Some(at) => {
                self.last_grant.insert(user.to_string(), at);
            }
            None => {
                self.last_grant.remove(user);
            }
        }
    }
}
