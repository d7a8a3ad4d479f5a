//! Payment provider seam
//!
//! Checkout and webhooks live outside the engine. The only provider call the
//! engine makes itself is cancelling a subscription, which must succeed
//! before the local record is cleared.

use async_trait::async_trait;
use credit_core::SubscriptionRecord;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProviderError(pub String);

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn cancel_subscription(
        &self,
        user: &str,
        record: &SubscriptionRecord,
    ) -> Result<(), ProviderError>;
}

/// Billing handled by support staff; provider calls always succeed
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBilling;

#[async_trait]
impl PaymentProvider for ManualBilling {
    async fn cancel_subscription(
        &self,
        user: &str,
        record: &SubscriptionRecord,
    ) -> Result<(), ProviderError> {
        tracing::info!(
            "manual billing: cancel '{}' for {} via {}",
            record.plan.name,
            user,
            record.payment_method
        );
        Ok(())
    }
}
