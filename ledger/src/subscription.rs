//! Subscription engine
//!
//! Subscribing grants the plan's monthly credits once and sets the renewal
//! date one calendar month out. Renewals are granted by `renew_due`, either
//! called directly or from the background worker.

use credit_core::subscription::one_month_after;
use credit_core::{
    Account, Plan, SubscriptionRecord, SubscriptionRenewal, TransactionKind, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::context::EngineContext;
use crate::provider::PaymentProvider;
use crate::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionReceipt {
    pub record: SubscriptionRecord,
    pub balance: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalReport {
    pub renewed: usize,
    /// Records changed by someone else between listing and renewing
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SubscriptionEngine {
    ctx: EngineContext,
    provider: Arc<dyn PaymentProvider>,
}

impl SubscriptionEngine {
    pub fn new(ctx: EngineContext, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { ctx, provider }
    }

    pub async fn current(&self, user: &str) -> Result<Option<SubscriptionRecord>> {
        self.ctx
            .call("subscription", || self.ctx.store.subscription(user))
            .await
    }

    /// Replaces any active subscription and grants the plan credits once
    pub async fn subscribe(
        &self,
        user: &str,
        plan: Plan,
        payment_method: &str,
    ) -> Result<SubscriptionReceipt> {
        validate_plan(&plan)?;

        let now = self.ctx.now();
        let grant = TransactionRecord::credit(
            user,
            TransactionKind::SubscriptionCredit,
            plan.monthly_credits,
            format!("Subscription credits: {}", plan.name),
            now,
        );
        let record = SubscriptionRecord::new(plan, payment_method, now);

        let account: Account = self
            .ctx
            .call("apply_subscription", || {
                self.ctx
                    .store
                    .apply_subscription(user, record.clone(), grant.clone())
            })
            .await?;

        tracing::info!(
            "{} subscribed to '{}' (+{} credits, renews {})",
            user,
            record.plan.name,
            record.plan.monthly_credits,
            record.renews_on
        );

        Ok(SubscriptionReceipt {
            record,
            balance: account.spendable_balance,
        })
    }

    /// Cancels with the provider first; the local record is only cleared once
    /// the provider confirms. Returns `None` when there was nothing to cancel.
    pub async fn cancel(&self, user: &str) -> Result<Option<SubscriptionRecord>> {
        let Some(record) = self.current(user).await? else {
            tracing::debug!("{} has no subscription to cancel", user);
            return Ok(None);
        };

        if let Err(e) = self.provider.cancel_subscription(user, &record).await {
            tracing::warn!("provider cancel for {} failed: {}", user, e);
            return Err(LedgerError::ProviderCallFailed(e.to_string()));
        }

        let audit = TransactionRecord::marker(
            user,
            TransactionKind::SubscriptionCancel,
            format!("Subscription cancelled: {}", record.plan.name),
            self.ctx.now(),
        );
        let removed = self
            .ctx
            .call("clear_subscription", || {
                self.ctx.store.clear_subscription(user, audit.clone())
            })
            .await?;

        if removed.is_some() {
            tracing::info!("{} cancelled '{}'", user, record.plan.name);
        }
        Ok(removed)
    }

    /// Grant one month of credits to every subscription whose renewal date
    /// has passed and move the date forward a month. Subscriptions several
    /// months behind catch up one month per call.
    pub async fn renew_due(&self) -> Result<RenewalReport> {
        let now = self.ctx.now();
        let due = self
            .ctx
            .call("due_subscriptions", || self.ctx.store.due_subscriptions(now))
            .await?;

        let mut report = RenewalReport::default();
        for (user, record) in due {
            let renewal = SubscriptionRenewal {
                user_id: user.clone(),
                expected_renews_on: record.renews_on,
                next_renews_on: one_month_after(record.renews_on),
                grant: TransactionRecord::credit(
                    user.as_str(),
                    TransactionKind::SubscriptionCredit,
                    record.plan.monthly_credits,
                    format!("Subscription renewal: {}", record.plan.name),
                    now,
                ),
            };

            let outcome = self
                .ctx
                .call("renew_subscription", || {
                    self.ctx.store.renew_subscription(renewal.clone())
                })
                .await;

            match outcome {
                Ok(true) => {
                    tracing::info!(
                        "renewed '{}' for {} (+{} credits)",
                        record.plan.name,
                        user,
                        record.plan.monthly_credits
                    );
                    report.renewed += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("renewal for {} failed: {}", user, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run `renew_due` on a fixed interval until the handle is aborted
    pub fn spawn_renewal_worker(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match engine.renew_due().await {
                    Ok(report) if report.renewed > 0 || report.failed > 0 => {
                        tracing::info!(
                            "renewal pass: {} renewed, {} skipped, {} failed",
                            report.renewed,
                            report.skipped,
                            report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("renewal pass failed: {}", e),
                }
            }
        })
    }
}

fn validate_plan(plan: &Plan) -> Result<()> {
    if plan.name.trim().is_empty() {
        return Err(LedgerError::InvalidPlan("plan name is required".to_string()));
    }
    if plan.monthly_credits == 0 {
        return Err(LedgerError::InvalidPlan(
            "monthly credits must be greater than 0".to_string(),
        ));
    }
    if !plan.price.is_finite() || plan.price < 0.0 {
        return Err(LedgerError::InvalidPlan(format!(
            "invalid price {}",
            plan.price
        )));
    }
    Ok(())
}
