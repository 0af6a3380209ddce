use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        BankInfo, PaymentInitiation, PaymentProviderPort, PaymentRequest, PaymentVerification,
        RefundResult,
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::WebhookEvent},
    infra::{
        http_client::{build_client, read_json, transport_error},
        webhook_signature::verify_sha512_hex,
    },
};

pub const PAYSTACK_API_BASE: &str = "https://api.paystack.co";

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "GHS", "ZAR", "KES", "USD"];

const SUPPORTED_BANKS: &[BankInfo] = &[
    BankInfo { code: "044", name: "Access Bank" },
    BankInfo { code: "011", name: "First Bank of Nigeria" },
    BankInfo { code: "058", name: "Guaranty Trust Bank" },
    BankInfo { code: "033", name: "United Bank For Africa" },
    BankInfo { code: "057", name: "Zenith Bank" },
];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PaystackResponse<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

impl<T> PaystackResponse<T> {
    fn into_data(self) -> AppResult<T> {
        match (self.status, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(AppError::Gateway(format!("Paystack: {}", self.message))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaystackInitialization {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackCustomer {
    email: Option<String>,
}

/// Transaction object shared by the verify endpoint and charge webhooks.
/// Amounts are already in minor units (kobo, pesewas, cents).
#[derive(Debug, Deserialize)]
struct PaystackTransaction {
    id: Option<i64>,
    reference: String,
    status: String,
    amount: i64,
    currency: String,
    paid_at: Option<DateTime<Utc>>,
    customer: Option<PaystackCustomer>,
    gateway_response: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl PaystackTransaction {
    fn into_verification(self) -> PaymentVerification {
        PaymentVerification {
            reference: self.reference,
            transaction_id: self.id.map(|id| id.to_string()),
            status: self.status.to_lowercase(),
            amount_cents: self.amount,
            currency: self.currency.to_uppercase(),
            paid_at: self.paid_at,
            customer_email: self.customer.and_then(|c| c.email),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaystackWebhook {
    event: String,
    data: PaystackTransaction,
}

#[derive(Debug, Deserialize)]
struct PaystackRefund {
    id: i64,
    amount: Option<i64>,
    status: String,
}

/// Normalize a charge webhook. The signature must already be verified.
fn parse_webhook(raw_body: &[u8]) -> AppResult<WebhookEvent> {
    let webhook: PaystackWebhook = serde_json::from_slice(raw_body)
        .map_err(|e| AppError::InvalidInput(format!("malformed Paystack webhook: {e}")))?;
    let tx = webhook.data;
    let status = tx.status.to_lowercase();
    let failure_reason = if status == "success" {
        None
    } else {
        tx.gateway_response.clone()
    };

    Ok(WebhookEvent {
        provider: PaymentProvider::Paystack,
        event_type: webhook.event,
        reference: tx.reference,
        transaction_id: tx.id.map(|id| id.to_string()),
        status,
        amount_cents: tx.amount,
        currency: tx.currency.to_uppercase(),
        paid_at: tx.paid_at,
        customer_email: tx.customer.and_then(|c| c.email),
        failure_reason,
        metadata: tx.metadata,
    })
}

// ============================================================================
// Adapter
// ============================================================================

/// Paystack: JSON webhooks signed with hex HMAC-SHA512 of the secret key.
#[derive(Clone)]
pub struct PaystackAdapter {
    client: Client,
    secret_key: SecretString,
    base_url: String,
}

impl PaystackAdapter {
    pub fn new(secret_key: SecretString, base_url: String) -> Self {
        Self {
            client: build_client(),
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key.expose_secret())
    }
}

#[async_trait]
impl PaymentProviderPort for PaystackAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paystack
    }

    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation> {
        request.validate(SUPPORTED_CURRENCIES)?;

        let body = json!({
            "email": request.customer_email,
            "amount": request.amount_cents,
            "currency": request.currency,
            "reference": request.reference,
            "callback_url": request.return_url,
            "metadata": {
                "invoice_id": request.invoice_id,
                "account_id": request.account_id,
                "cancel_action": request.cancel_url,
            },
        });

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Paystack", e))?;

        let init = read_json::<PaystackResponse<PaystackInitialization>>("Paystack", response)
            .await?
            .into_data()?;

        Ok(PaymentInitiation {
            reference: init.reference,
            redirect_url: Some(init.authorization_url),
            access_code: Some(init.access_code),
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| transport_error("Paystack", e))?;

        let tx = read_json::<PaystackResponse<PaystackTransaction>>("Paystack", response)
            .await?
            .into_data()?;
        Ok(tx.into_verification())
    }

    async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookEvent> {
        verify_sha512_hex(self.secret_key.expose_secret().as_bytes(), raw_body, signature)?;
        parse_webhook(raw_body)
    }

    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult> {
        let mut body = json!({ "transaction": reference });
        if let Some(amount) = amount_cents {
            body["amount"] = json!(amount);
        }

        let response = self
            .client
            .post(format!("{}/refund", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Paystack", e))?;

        let refund = read_json::<PaystackResponse<PaystackRefund>>("Paystack", response)
            .await?
            .into_data()?;

        Ok(RefundResult {
            refund_id: refund.id.to_string(),
            reference: reference.to_string(),
            amount_cents: refund.amount.or(amount_cents),
            status: refund.status.to_lowercase(),
        })
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        SUPPORTED_CURRENCIES
    }

    fn supported_banks(&self) -> &'static [BankInfo] {
        SUPPORTED_BANKS
    }
}
