use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment_provider::PaymentProvider;

/// Payment status for a single gateway transaction against an invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Unknown => "unknown",
        }
    }

    /// Map a gateway-reported status string onto the payment lifecycle.
    ///
    /// Anything unrecognised becomes `Unknown` and is left for manual review.
    pub fn from_gateway_status(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "successful" => PaymentStatus::Completed,
            "failed" | "cancelled" | "canceled" | "error" => PaymentStatus::Failed,
            "pending" => PaymentStatus::Pending,
            _ => PaymentStatus::Unknown,
        }
    }

    /// Only pending payments may change status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(self, PaymentStatus::Pending) && next != PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "unknown" => Ok(PaymentStatus::Unknown),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// A gateway transaction recorded against an invoice.
///
/// Unique per `(invoice_id, provider_transaction_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    /// Reference the gateway was given at checkout
    pub provider_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}
