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
    domain::entities::{
        money::{format_major_amount, major_amount_from_json},
        payment_provider::PaymentProvider,
        webhook_event::WebhookEvent,
    },
    infra::{
        http_client::{build_client, read_json, transport_error},
        webhook_signature::verify_sha256_base64,
    },
};

pub const FLUTTERWAVE_API_BASE: &str = "https://api.flutterwave.com/v3";

const SUPPORTED_CURRENCIES: &[&str] = &["NGN", "USD", "GHS", "KES", "ZAR", "EUR", "GBP"];

const SUPPORTED_BANKS: &[BankInfo] = &[];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FlutterwaveResponse<T> {
    status: String,
    message: String,
    data: Option<T>,
}

impl<T> FlutterwaveResponse<T> {
    fn into_data(self) -> AppResult<T> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data),
            _ => Err(AppError::Gateway(format!("Flutterwave: {}", self.message))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlutterwaveLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveCustomer {
    email: Option<String>,
}

/// Transaction object shared by verify responses and charge webhooks.
/// Amounts are in major units.
#[derive(Debug, Deserialize)]
struct FlutterwaveTransaction {
    id: Option<i64>,
    tx_ref: String,
    status: String,
    amount: serde_json::Value,
    currency: String,
    created_at: Option<DateTime<Utc>>,
    customer: Option<FlutterwaveCustomer>,
    processor_response: Option<String>,
    #[serde(default)]
    meta: serde_json::Value,
}

impl FlutterwaveTransaction {
    fn amount_cents(&self) -> AppResult<i64> {
        major_amount_from_json(&self.amount)
            .ok_or_else(|| AppError::InvalidInput(format!("invalid amount: {}", self.amount)))
    }

    fn paid_at(&self, status: &str) -> Option<DateTime<Utc>> {
        (status == "successful").then_some(self.created_at).flatten()
    }
}

#[derive(Debug, Deserialize)]
struct FlutterwaveWebhook {
    event: String,
    data: FlutterwaveTransaction,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveRefund {
    id: i64,
    amount_refunded: Option<serde_json::Value>,
    status: String,
}

fn parse_webhook(raw_body: &[u8]) -> AppResult<WebhookEvent> {
    let webhook: FlutterwaveWebhook = serde_json::from_slice(raw_body)
        .map_err(|e| AppError::InvalidInput(format!("malformed Flutterwave webhook: {e}")))?;
    let tx = webhook.data;
    let status = tx.status.to_lowercase();
    let amount_cents = tx.amount_cents()?;
    let paid_at = tx.paid_at(&status);
    let failure_reason = if status == "successful" {
        None
    } else {
        tx.processor_response.clone()
    };

    Ok(WebhookEvent {
        provider: PaymentProvider::Flutterwave,
        event_type: webhook.event,
        reference: tx.tx_ref,
        transaction_id: tx.id.map(|id| id.to_string()),
        status,
        amount_cents,
        currency: tx.currency.to_uppercase(),
        paid_at,
        customer_email: tx.customer.and_then(|c| c.email),
        failure_reason,
        metadata: tx.meta,
    })
}

// ============================================================================
// Adapter
// ============================================================================

/// Flutterwave: JSON webhooks signed with base64 HMAC-SHA256 of the
/// dashboard secret hash; API calls use the secret key.
#[derive(Clone)]
pub struct FlutterwaveAdapter {
    client: Client,
    secret_key: SecretString,
    secret_hash: SecretString,
    base_url: String,
}

impl FlutterwaveAdapter {
    pub fn new(secret_key: SecretString, secret_hash: SecretString, base_url: String) -> Self {
        Self {
            client: build_client(),
            secret_key,
            secret_hash,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key.expose_secret())
    }

    async fn fetch_transaction(&self, reference: &str) -> AppResult<FlutterwaveTransaction> {
        let response = self
            .client
            .get(format!("{}/transactions/verify_by_reference", self.base_url))
            .query(&[("tx_ref", reference)])
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| transport_error("Flutterwave", e))?;

        read_json::<FlutterwaveResponse<FlutterwaveTransaction>>("Flutterwave", response)
            .await?
            .into_data()
    }
}

#[async_trait]
impl PaymentProviderPort for FlutterwaveAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Flutterwave
    }

    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation> {
        request.validate(SUPPORTED_CURRENCIES)?;

        let body = json!({
            "tx_ref": request.reference,
            "amount": format_major_amount(request.amount_cents),
            "currency": request.currency,
            "redirect_url": request.return_url,
            "customer": {
                "email": request.customer_email,
                "name": request.customer_name,
            },
            "customizations": {
                "title": request.description,
            },
            "meta": {
                "invoice_id": request.invoice_id,
                "account_id": request.account_id,
            },
        });

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Flutterwave", e))?;

        let link = read_json::<FlutterwaveResponse<FlutterwaveLink>>("Flutterwave", response)
            .await?
            .into_data()?;

        Ok(PaymentInitiation {
            reference: request.reference.clone(),
            redirect_url: Some(link.link),
            access_code: None,
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification> {
        let tx = self.fetch_transaction(reference).await?;
        let status = tx.status.to_lowercase();
        Ok(PaymentVerification {
            amount_cents: tx.amount_cents()?,
            paid_at: tx.paid_at(&status),
            reference: tx.tx_ref,
            transaction_id: tx.id.map(|id| id.to_string()),
            status,
            currency: tx.currency.to_uppercase(),
            customer_email: tx.customer.and_then(|c| c.email),
        })
    }

    async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookEvent> {
        verify_sha256_base64(
            self.secret_hash.expose_secret().as_bytes(),
            raw_body,
            signature,
        )?;
        parse_webhook(raw_body)
    }

    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult> {
        // Refunds are keyed by the gateway transaction id, not our reference.
        let tx = self.fetch_transaction(reference).await?;
        let transaction_id = tx
            .id
            .ok_or_else(|| AppError::Gateway("Flutterwave: transaction has no id".into()))?;

        let body = match amount_cents {
            Some(amount) => json!({ "amount": format_major_amount(amount) }),
            None => json!({}),
        };

        let response = self
            .client
            .post(format!(
                "{}/transactions/{}/refund",
                self.base_url, transaction_id
            ))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Flutterwave", e))?;

        let refund = read_json::<FlutterwaveResponse<FlutterwaveRefund>>("Flutterwave", response)
            .await?
            .into_data()?;

        Ok(RefundResult {
            refund_id: refund.id.to_string(),
            reference: reference.to_string(),
            amount_cents: refund
                .amount_refunded
                .as_ref()
                .and_then(major_amount_from_json)
                .or(amount_cents),
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
