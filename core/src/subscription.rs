//! Subscription plans and per-user subscription records

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    /// Display price charged by the payment provider
    pub price: f64,
    pub currency: String,
    pub monthly_credits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub plan: Plan,
    pub started_at: DateTime<Utc>,
    pub renews_on: DateTime<Utc>,
    pub payment_method: String,
}

impl SubscriptionRecord {
    pub fn new(plan: Plan, payment_method: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            plan,
            started_at: now,
            renews_on: one_month_after(now),
            payment_method: payment_method.into(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.renews_on <= now
    }
}

/// One calendar month later, clamped to the end of shorter months
/// (Jan 31 renews on Feb 28/29).
pub fn one_month_after(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(1)).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> Plan {
        Plan {
            name: "Gold".to_string(),
            price: 9.99,
            currency: "USD".to_string(),
            monthly_credits: 500,
        }
    }

    #[test]
    fn test_renewal_is_one_calendar_month() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let record = SubscriptionRecord::new(plan(), "card", now);
        assert_eq!(
            record.renews_on,
            Utc.with_ymd_and_hms(2026, 4, 15, 12, 0, 0).unwrap()
        );
        assert!(!record.is_due(now));
        assert!(record.is_due(record.renews_on));
    }

    #[test]
    fn test_month_end_clamps() {
        let jan31 = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            one_month_after(jan31),
            Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()
        );
    }
}
