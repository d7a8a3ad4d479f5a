//! Balance ledger
//!
//! The only path that changes a spendable balance. Each credit or debit is a
//! single conditional store update paired with its transaction record; the
//! returned account is the committed store value.

use credit_core::{Account, CreatorTransactionRecord, TransactionKind, TransactionRecord};

use crate::context::EngineContext;
use crate::{LedgerError, Result};

#[derive(Clone)]
pub struct BalanceLedger {
    ctx: EngineContext,
}

impl BalanceLedger {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Create the account on first login; existing accounts are returned as-is
    pub async fn open_account(&self, user: &str) -> Result<Account> {
        let now = self.ctx.now();
        let account = self
            .ctx
            .call("open_account", || self.ctx.store.open_account(user, now))
            .await?;
        tracing::debug!("account {} ready (balance {})", user, account.spendable_balance);
        Ok(account)
    }

    pub async fn account(&self, user: &str) -> Result<Account> {
        self.ctx
            .call("account", || self.ctx.store.account(user))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))
    }

    pub async fn credit(
        &self,
        user: &str,
        amount: u64,
        description: &str,
        kind: TransactionKind,
    ) -> Result<Account> {
        ensure_positive(amount)?;
        let record = TransactionRecord::credit(user, kind, amount, description, self.ctx.now());

        let account = self
            .ctx
            .call("credit", || {
                self.ctx.store.apply_credit(user, amount, record.clone())
            })
            .await?;

        tracing::info!(
            "credited {} to {} ({}): balance {}",
            amount,
            user,
            kind,
            account.spendable_balance
        );
        Ok(account)
    }

    pub async fn debit(
        &self,
        user: &str,
        amount: u64,
        description: &str,
        kind: TransactionKind,
    ) -> Result<Account> {
        ensure_positive(amount)?;
        let record = TransactionRecord::debit(user, kind, amount, description, self.ctx.now());

        let result = self
            .ctx
            .call("debit", || {
                self.ctx.store.apply_debit(user, amount, record.clone())
            })
            .await;

        match result {
            Ok(account) => {
                tracing::info!(
                    "debited {} from {} ({}): balance {}",
                    amount,
                    user,
                    kind,
                    account.spendable_balance
                );
                Ok(account)
            }
            Err(e) => {
                tracing::warn!("debit of {} from {} rejected: {}", amount, user, e);
                Err(e)
            }
        }
    }

    /// Credits bought through the payment provider
    pub async fn top_up(&self, user: &str, amount: u64, reference: &str) -> Result<Account> {
        self.credit(
            user,
            amount,
            &format!("Credit top-up ({})", reference),
            TransactionKind::TopUp,
        )
        .await
    }

    pub async fn admin_grant(&self, user: &str, amount: u64, note: &str) -> Result<Account> {
        self.credit(
            user,
            amount,
            &format!("Admin grant: {}", note),
            TransactionKind::AdminGrant,
        )
        .await
    }

    pub async fn history(&self, user: &str) -> Result<Vec<TransactionRecord>> {
        self.ctx
            .call("transactions", || self.ctx.store.transactions(user))
            .await
    }

    pub async fn sales(&self, creator: &str) -> Result<Vec<CreatorTransactionRecord>> {
        self.ctx
            .call("creator_transactions", || {
                self.ctx.store.creator_transactions(creator)
            })
            .await
    }
}

fn ensure_positive(amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount(
            "amount must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
