//! Creator withdrawal gate
//!
//! Withdrawals are paid out by hand. The gate only enforces the cooldown
//! between requests and records that a request was made; the earned balance
//! is left for the payout process to settle.

use chrono::{DateTime, Utc};
use credit_core::store::withdrawal_ready_at;
use credit_core::{Account, TransactionKind, TransactionRecord, UserId};
use economics::{PayoutQuote, PriceCalculator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::context::EngineContext;
use crate::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalStatus {
    pub ready: bool,
    pub ready_at: Option<DateTime<Utc>>,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalTicket {
    pub account_id: UserId,
    pub requested_at: DateTime<Utc>,
    pub earned_balance: u64,
    pub payout: PayoutQuote,
}

/// True once `cooldown` has passed since the last request (or there was none)
pub fn is_withdrawal_ready(account: &Account, cooldown: Duration, now: DateTime<Utc>) -> bool {
    match withdrawal_ready_at(account.last_withdrawal_at, signed(cooldown)) {
        Some(ready_at) => now >= ready_at,
        None => true,
    }
}

fn signed(cooldown: Duration) -> chrono::Duration {
    chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX)
}

#[derive(Clone)]
pub struct WithdrawalGate {
    ctx: EngineContext,
}

impl WithdrawalGate {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    async fn load(&self, user: &str) -> Result<Account> {
        self.ctx
            .call("account", || self.ctx.store.account(user))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))
    }

    pub async fn status(&self, user: &str) -> Result<WithdrawalStatus> {
        let account = self.load(user).await?;
        let cooldown = signed(self.ctx.policy().withdrawal_cooldown());
        let now = self.ctx.now();

        let ready_at = withdrawal_ready_at(account.last_withdrawal_at, cooldown);
        let remaining_secs = ready_at
            .map(|at| ((at - now).num_milliseconds().max(0) as u64).div_ceil(1000))
            .unwrap_or(0);

        Ok(WithdrawalStatus {
            ready: remaining_secs == 0,
            ready_at,
            remaining_secs,
        })
    }

    /// Record a withdrawal request. A denied request changes nothing, so
    /// repeated early attempts never push the ready time further out.
    pub async fn request_withdrawal(&self, user: &str) -> Result<WithdrawalTicket> {
        let policy = self.ctx.policy();
        let cooldown = policy.withdrawal_cooldown();
        let now = self.ctx.now();

        let account = self.load(user).await?;
        if !is_withdrawal_ready(&account, cooldown, now) {
            let ready_at = withdrawal_ready_at(account.last_withdrawal_at, signed(cooldown))
                .unwrap_or(now);
            tracing::warn!("withdrawal for {} denied until {}", user, ready_at);
            return Err(LedgerError::cooldown(ready_at, now));
        }

        let marker = TransactionRecord::marker(
            user,
            TransactionKind::WithdrawalMarker,
            format!("Withdrawal requested ({} credits earned)", account.earned_balance),
            now,
        );
        let stamped = self
            .ctx
            .call("stamp_withdrawal", || {
                self.ctx
                    .store
                    .stamp_withdrawal(user, now, signed(cooldown), marker.clone())
            })
            .await;

        let account = match stamped {
            Ok(account) => account,
            Err(LedgerError::CooldownActive { ready_at, .. }) => {
                // Lost a race with a concurrent request
                return Err(LedgerError::cooldown(ready_at, now));
            }
            Err(e) => return Err(e),
        };

        let payout = PriceCalculator::payout_quote(account.earned_balance, policy.credit_rate);
        tracing::info!(
            "withdrawal requested by {}: {} credits (~{:.2})",
            user,
            account.earned_balance,
            payout.currency_amount
        );

        Ok(WithdrawalTicket {
            account_id: account.id,
            requested_at: now,
            earned_balance: account.earned_balance,
            payout,
        })
    }
}
