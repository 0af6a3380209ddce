use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
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
        money::{format_major_amount, parse_major_amount},
        payment_provider::PaymentProvider,
        webhook_event::WebhookEvent,
    },
    infra::{
        http_client::{build_client, read_json, transport_error},
        webhook_signature::{hmac_sha256_hex, verify_sha256_hex},
    },
};

pub const PAYFAST_PROCESS_URL: &str = "https://www.payfast.co.za/eng/process";
pub const PAYFAST_API_BASE: &str = "https://api.payfast.co.za";

const API_VERSION: &str = "v1";

const SUPPORTED_CURRENCIES: &[&str] = &["ZAR"];

const SUPPORTED_BANKS: &[BankInfo] = &[
    BankInfo { code: "absa", name: "ABSA" },
    BankInfo { code: "capitec", name: "Capitec Bank" },
    BankInfo { code: "fnb", name: "First National Bank" },
    BankInfo { code: "nedbank", name: "Nedbank" },
    BankInfo { code: "standard_bank", name: "Standard Bank" },
];

pub struct PayfastSettings {
    pub merchant_id: String,
    pub merchant_key: SecretString,
    /// Shared passphrase; keys both ITN signatures and API request signatures
    pub passphrase: SecretString,
    pub process_url: String,
    pub api_base: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PayfastApiResponse<T> {
    status: String,
    data: Option<PayfastApiData<T>>,
}

#[derive(Debug, Deserialize)]
struct PayfastApiData<T> {
    response: T,
    message: Option<String>,
}

impl<T> PayfastApiResponse<T> {
    fn into_response(self) -> AppResult<T> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data.response),
            (_, data) => Err(AppError::Gateway(format!(
                "PayFast: {}",
                data.and_then(|d| d.message).unwrap_or(self.status)
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PayfastTransaction {
    pf_payment_id: Option<serde_json::Value>,
    m_payment_id: String,
    payment_status: String,
    amount_gross: serde_json::Value,
    email_address: Option<String>,
}

impl PayfastTransaction {
    fn into_verification(self) -> AppResult<PaymentVerification> {
        let amount_cents = match &self.amount_gross {
            serde_json::Value::String(s) => parse_major_amount(s),
            serde_json::Value::Number(n) => parse_major_amount(&n.to_string()),
            _ => None,
        }
        .ok_or_else(|| AppError::Gateway("PayFast: invalid amount_gross".into()))?;

        Ok(PaymentVerification {
            reference: self.m_payment_id,
            transaction_id: self.pf_payment_id.as_ref().map(json_to_string),
            status: self.payment_status.to_lowercase(),
            amount_cents,
            currency: "ZAR".to_string(),
            paid_at: None,
            customer_email: self.email_address,
        })
    }
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> AppResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("PayFast ITN missing {name}")))
}

/// Normalize an ITN (form-encoded). The signature must already be verified.
fn parse_itn(raw_body: &[u8]) -> AppResult<WebhookEvent> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(raw_body)
        .into_owned()
        .collect();

    let reference = required(&fields, "m_payment_id")?.to_string();
    let status = required(&fields, "payment_status")?.to_lowercase();
    let amount_raw = required(&fields, "amount_gross")?;
    let amount_cents = parse_major_amount(amount_raw)
        .ok_or_else(|| AppError::InvalidInput(format!("invalid amount_gross: {amount_raw}")))?;
    let failure_reason = matches!(status.as_str(), "failed" | "cancelled")
        .then(|| format!("PayFast payment {status}"));

    Ok(WebhookEvent {
        provider: PaymentProvider::Payfast,
        event_type: format!("itn.{status}"),
        reference,
        transaction_id: fields.get("pf_payment_id").cloned().filter(|v| !v.is_empty()),
        status,
        amount_cents,
        currency: "ZAR".to_string(),
        paid_at: None,
        customer_email: fields.get("email_address").cloned(),
        failure_reason,
        metadata: json!({
            "invoice_id": fields.get("custom_str1"),
            "account_id": fields.get("custom_str2"),
        }),
    })
}

// ============================================================================
// Adapter
// ============================================================================

/// PayFast: redirect checkout plus form-encoded ITN callbacks signed with
/// hex HMAC-SHA256 of the passphrase.
pub struct PayfastAdapter {
    client: Client,
    settings: PayfastSettings,
}

impl PayfastAdapter {
    pub fn new(settings: PayfastSettings) -> Self {
        Self {
            client: build_client(),
            settings: PayfastSettings {
                process_url: settings.process_url.trim_end_matches('/').to_string(),
                api_base: settings.api_base.trim_end_matches('/').to_string(),
                ..settings
            },
        }
    }

    fn passphrase(&self) -> &[u8] {
        self.settings.passphrase.expose_secret().as_bytes()
    }

    /// Hosted-checkout URL with the signed query string.
    fn checkout_url(&self, request: &PaymentRequest) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("merchant_id", &self.settings.merchant_id);
        query.append_pair("merchant_key", self.settings.merchant_key.expose_secret());
        query.append_pair("return_url", &request.return_url);
        if let Some(cancel_url) = &request.cancel_url {
            query.append_pair("cancel_url", cancel_url);
        }
        if let Some(notify_url) = &request.notify_url {
            query.append_pair("notify_url", notify_url);
        }
        if let Some(name) = &request.customer_name {
            query.append_pair("name_first", name);
        }
        query.append_pair("email_address", &request.customer_email);
        query.append_pair("m_payment_id", &request.reference);
        query.append_pair("amount", &format_major_amount(request.amount_cents));
        query.append_pair("item_name", &request.description);
        query.append_pair("custom_str1", &request.invoice_id.to_string());
        query.append_pair("custom_str2", &request.account_id.to_string());
        let unsigned = query.finish();

        let signature = hmac_sha256_hex(self.passphrase(), unsigned.as_bytes());
        format!(
            "{}?{}&signature={}",
            self.settings.process_url, unsigned, signature
        )
    }

    fn signed(&self, builder: RequestBuilder) -> RequestBuilder {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let canonical = format!(
            "merchant-id={}&timestamp={}&version={}",
            self.settings.merchant_id, timestamp, API_VERSION
        );
        builder
            .header("merchant-id", &self.settings.merchant_id)
            .header("version", API_VERSION)
            .header("timestamp", timestamp)
            .header(
                "signature",
                hmac_sha256_hex(self.passphrase(), canonical.as_bytes()),
            )
    }
}

#[async_trait]
impl PaymentProviderPort for PayfastAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Payfast
    }

    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation> {
        request.validate(SUPPORTED_CURRENCIES)?;
        Ok(PaymentInitiation {
            reference: request.reference.clone(),
            redirect_url: Some(self.checkout_url(request)),
            access_code: None,
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification> {
        let response = self
            .signed(self.client.get(format!(
                "{}/process/query/{}",
                self.settings.api_base, reference
            )))
            .send()
            .await
            .map_err(|e| transport_error("PayFast", e))?;

        read_json::<PayfastApiResponse<PayfastTransaction>>("PayFast", response)
            .await?
            .into_response()?
            .into_verification()
    }

    async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookEvent> {
        verify_sha256_hex(self.passphrase(), raw_body, signature)?;
        parse_itn(raw_body)
    }

    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult> {
        // Refunds are keyed by pf_payment_id and always carry an explicit amount.
        let verification = self.verify_payment(reference).await?;
        let pf_payment_id = verification
            .transaction_id
            .ok_or_else(|| AppError::Gateway("PayFast: payment has no pf_payment_id".into()))?;
        let amount = amount_cents.unwrap_or(verification.amount_cents);

        let response = self
            .signed(self.client.post(format!(
                "{}/refunds/{}",
                self.settings.api_base, pf_payment_id
            )))
            .json(&json!({ "amount": amount, "reason": format!("Refund {reference}") }))
            .send()
            .await
            .map_err(|e| transport_error("PayFast", e))?;

        read_json::<PayfastApiResponse<serde_json::Value>>("PayFast", response)
            .await?
            .into_response()?;

        Ok(RefundResult {
            refund_id: pf_payment_id,
            reference: reference.to_string(),
            amount_cents: Some(amount),
            status: "pending".to_string(),
        })
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        SUPPORTED_CURRENCIES
    }

    fn supported_banks(&self) -> &'static [BankInfo] {
        SUPPORTED_BANKS
    }
}
