use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::payment_provider::PaymentProvider;

/// Customer notifications and operator alerts emitted by billing flows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    InvoiceIssued {
        account_id: Uuid,
        invoice_number: String,
        total_cents: i64,
        currency: String,
        customer_email: String,
    },
    PaymentSucceeded {
        account_id: Uuid,
        invoice_number: String,
        amount_cents: i64,
        currency: String,
        invoice_paid: bool,
    },
    PaymentFailed {
        account_id: Uuid,
        invoice_number: String,
        reason: Option<String>,
    },
    SubscriptionSuspended {
        account_id: Uuid,
        subscription_id: Uuid,
        invoice_number: String,
    },
    /// Operator alert: the payment committed but the wallet was not credited
    WalletCreditFailed {
        account_id: Uuid,
        payment_id: Uuid,
        invoice_number: String,
        amount_cents: i64,
        error: String,
    },
    /// Operator alert: a webhook needs manual review
    ManualReview {
        provider: PaymentProvider,
        reference: String,
        reason: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::InvoiceIssued { .. } => "invoice_issued",
            Notification::PaymentSucceeded { .. } => "payment_succeeded",
            Notification::PaymentFailed { .. } => "payment_failed",
            Notification::SubscriptionSuspended { .. } => "subscription_suspended",
            Notification::WalletCreditFailed { .. } => "wallet_credit_failed",
            Notification::ManualReview { .. } => "manual_review",
        }
    }
}

/// Best-effort delivery: implementations log failures instead of returning them,
/// so a notification can never undo committed billing state.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification);
}
