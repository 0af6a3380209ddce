use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{payment_provider::PaymentProvider, webhook_event::WebhookEvent},
    validators::{is_valid_callback_url, is_valid_email, is_valid_payment_reference},
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Request to collect money for an invoice through a gateway
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    /// Reference the gateway echoes back in webhooks: the invoice number plus a
    /// per-attempt suffix
    pub reference: String,
    /// Always minor units; adapters convert to the gateway's native unit
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub description: String,
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    /// Where the customer lands after paying
    pub return_url: String,
    pub cancel_url: Option<String>,
    /// Server-to-server notification URL, for gateways that take it per request
    pub notify_url: Option<String>,
}

impl PaymentRequest {
    /// Checks shared by every adapter before calling out to a gateway
    pub fn validate(&self, supported_currencies: &[&str]) -> AppResult<()> {
        if self.amount_cents <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        if !is_valid_payment_reference(&self.reference) {
            return Err(AppError::InvalidInput("invalid payment reference".into()));
        }
        if !is_valid_email(&self.customer_email) {
            return Err(AppError::InvalidInput("invalid customer email".into()));
        }
        if !is_valid_callback_url(&self.return_url) {
            return Err(AppError::InvalidInput("invalid return url".into()));
        }
        if !supported_currencies.contains(&self.currency.as_str()) {
            return Err(AppError::InvalidInput(format!(
                "currency {} is not supported",
                self.currency
            )));
        }
        Ok(())
    }
}

/// Result of initiating a payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInitiation {
    pub reference: String,
    /// Hosted checkout page to send the customer to
    pub redirect_url: Option<String>,
    /// Gateway access code for inline checkout widgets
    pub access_code: Option<String>,
}

/// Synchronous confirmation of a payment's state, independent of webhooks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentVerification {
    pub reference: String,
    pub transaction_id: Option<String>,
    /// Raw gateway status, lowercased
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
}

impl PaymentVerification {
    /// Normalize into the same shape webhooks produce so both paths share
    /// one reconciliation flow.
    pub fn into_event(self, provider: PaymentProvider) -> WebhookEvent {
        WebhookEvent {
            provider,
            event_type: "verification".to_string(),
            reference: self.reference,
            transaction_id: self.transaction_id,
            status: self.status,
            amount_cents: self.amount_cents,
            currency: self.currency,
            paid_at: self.paid_at,
            customer_email: self.customer_email,
            failure_reason: None,
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundResult {
    pub refund_id: String,
    pub reference: String,
    /// `None` when the gateway did not report the refunded amount
    pub amount_cents: Option<i64>,
    pub status: String,
}

/// A bank a gateway can pull funds from (EFT / bank-transfer gateways)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BankInfo {
    pub code: &'static str,
    pub name: &'static str,
}

// ============================================================================
// Payment Provider Port
// ============================================================================

/// Gateway adapter contract.
///
/// `process_webhook` must verify `signature` over the exact raw bytes before
/// parsing anything and fail with `AppError::InvalidSignature` otherwise.
#[async_trait]
pub trait PaymentProviderPort: Send + Sync {
    /// Get the provider type
    fn provider(&self) -> PaymentProvider;

    /// Initiate a payment and return where to send the customer.
    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation>;

    /// Ask the gateway for the current state of a payment by reference.
    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification>;

    /// Authenticate and normalize an inbound webhook.
    async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookEvent>;

    /// Refund a payment. `amount_cents = None` refunds in full.
    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult>;

    fn supported_currencies(&self) -> &'static [&'static str];

    fn supported_banks(&self) -> &'static [BankInfo];
}
