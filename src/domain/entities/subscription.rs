use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Only active subscriptions are billed by the batch run
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account's plan and usage allowance for the current period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub tier: String,
    pub price_cents: i64,
    pub currency: String,
    pub status: SubscriptionStatus,
    /// `None` means unlimited calls, so no overage is ever billed
    pub calls_limit: Option<i64>,
    pub calls_used: i64,
    /// Price per call above `calls_limit`
    pub overage_rate_cents: i64,
    pub customer_email: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Calls above the limit; zero when no limit is configured.
    pub fn overage_calls(&self) -> i64 {
        match self.calls_limit {
            Some(limit) => (self.calls_used - limit).max(0),
            None => 0,
        }
    }

    pub fn overage_fee_cents(&self) -> i64 {
        self.overage_calls() * self.overage_rate_cents
    }
}

/// Usage totals reported for a subscription over one billing period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub usage_cost_cents: i64,
    pub transaction_count: i64,
    pub transaction_fee_cents: i64,
}
