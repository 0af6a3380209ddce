use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
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
        money::{format_major_amount, major_amount_from_json, parse_major_amount},
        payment_provider::PaymentProvider,
        webhook_event::WebhookEvent,
    },
    infra::{
        http_client::{build_client, read_json, transport_error},
        webhook_signature::{hmac_sha512_hex, verify_sha512_hex},
    },
};

pub const OZOW_API_BASE: &str = "https://api.ozow.com";

const SUPPORTED_CURRENCIES: &[&str] = &["ZAR"];

const SUPPORTED_BANKS: &[BankInfo] = &[
    BankInfo { code: "absa", name: "ABSA" },
    BankInfo { code: "african_bank", name: "African Bank" },
    BankInfo { code: "capitec", name: "Capitec Bank" },
    BankInfo { code: "discovery", name: "Discovery Bank" },
    BankInfo { code: "fnb", name: "First National Bank" },
    BankInfo { code: "investec", name: "Investec" },
    BankInfo { code: "nedbank", name: "Nedbank" },
    BankInfo { code: "standard_bank", name: "Standard Bank" },
    BankInfo { code: "tymebank", name: "TymeBank" },
];

pub struct OzowSettings {
    pub site_code: String,
    pub api_key: SecretString,
    /// Signs payment requests and keys notification signatures
    pub private_key: SecretString,
    pub api_base: String,
    pub is_test: bool,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OzowPaymentResponse {
    url: Option<String>,
    payment_request_id: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OzowTransaction {
    transaction_id: String,
    transaction_reference: String,
    amount: serde_json::Value,
    status: String,
    currency_code: Option<String>,
    payment_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OzowRefundResponse {
    refund_id: Option<String>,
    refund_status: Option<String>,
    error_message: Option<String>,
}

/// Ozow reports local timestamps without an offset; treat them as UTC.
fn parse_ozow_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

impl OzowTransaction {
    fn into_verification(self) -> AppResult<PaymentVerification> {
        let amount_cents = major_amount_from_json(&self.amount)
            .ok_or_else(|| AppError::Gateway("Ozow: invalid amount".into()))?;
        Ok(PaymentVerification {
            reference: self.transaction_reference,
            transaction_id: Some(self.transaction_id),
            status: self.status.to_lowercase(),
            amount_cents,
            currency: self.currency_code.unwrap_or_else(|| "ZAR".into()),
            paid_at: self.payment_date.as_deref().and_then(parse_ozow_timestamp),
            customer_email: None,
        })
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> AppResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("Ozow notification missing {name}")))
}

fn parse_notification(raw_body: &[u8]) -> AppResult<WebhookEvent> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(raw_body)
        .into_owned()
        .collect();

    let status = field(&fields, "Status")?.to_lowercase();
    let amount_raw = field(&fields, "Amount")?;
    let amount_cents = parse_major_amount(amount_raw)
        .ok_or_else(|| AppError::InvalidInput(format!("invalid Amount: {amount_raw}")))?;
    let failure_reason = match status.as_str() {
        "complete" | "pending" => None,
        _ => fields.get("StatusMessage").cloned().filter(|m| !m.is_empty()),
    };

    Ok(WebhookEvent {
        provider: PaymentProvider::Ozow,
        event_type: format!("notification.{status}"),
        reference: field(&fields, "TransactionReference")?.to_string(),
        transaction_id: Some(field(&fields, "TransactionId")?.to_string()),
        status,
        amount_cents,
        currency: fields
            .get("CurrencyCode")
            .cloned()
            .unwrap_or_else(|| "ZAR".into()),
        paid_at: None,
        customer_email: None,
        failure_reason,
        metadata: json!({
            "site_code": fields.get("SiteCode"),
            "is_test": fields.get("IsTest"),
            "invoice_id": fields.get("Optional1"),
        }),
    })
}

// ============================================================================
// Adapter
// ============================================================================

/// Ozow instant EFT: form-encoded notifications signed with hex
/// HMAC-SHA512 of the private key.
pub struct OzowAdapter {
    client: Client,
    settings: OzowSettings,
}

impl OzowAdapter {
    pub fn new(settings: OzowSettings) -> Self {
        Self {
            client: build_client(),
            settings: OzowSettings {
                api_base: settings.api_base.trim_end_matches('/').to_string(),
                ..settings
            },
        }
    }

    fn private_key(&self) -> &[u8] {
        self.settings.private_key.expose_secret().as_bytes()
    }

    /// Hash over the request fields in posting order, lowercased.
    fn hash_check(&self, parts: &[&str]) -> String {
        hmac_sha512_hex(self.private_key(), parts.concat().to_lowercase().as_bytes())
    }

    async fn fetch_transaction(&self, reference: &str) -> AppResult<OzowTransaction> {
        let response = self
            .client
            .get(format!("{}/GetTransactionByReference", self.settings.api_base))
            .query(&[
                ("siteCode", self.settings.site_code.as_str()),
                ("transactionReference", reference),
            ])
            .header("ApiKey", self.settings.api_key.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error("Ozow", e))?;

        // Retries for the same reference are listed oldest first.
        read_json::<Vec<OzowTransaction>>("Ozow", response)
            .await?
            .pop()
            .ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl PaymentProviderPort for OzowAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Ozow
    }

    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation> {
        request.validate(SUPPORTED_CURRENCIES)?;

        let amount = format_major_amount(request.amount_cents);
        let cancel_url = request.cancel_url.as_deref().unwrap_or(&request.return_url);
        let notify_url = request.notify_url.as_deref().unwrap_or_default();
        let is_test = self.settings.is_test.to_string();
        let hash_check = self.hash_check(&[
            self.settings.site_code.as_str(),
            "ZA",
            request.currency.as_str(),
            amount.as_str(),
            request.reference.as_str(),
            request.reference.as_str(),
            cancel_url,
            cancel_url,
            request.return_url.as_str(),
            notify_url,
            is_test.as_str(),
        ]);

        let body = json!({
            "siteCode": self.settings.site_code,
            "countryCode": "ZA",
            "currencyCode": request.currency,
            "amount": amount,
            "transactionReference": request.reference,
            "bankReference": request.reference,
            "cancelUrl": cancel_url,
            "errorUrl": cancel_url,
            "successUrl": request.return_url,
            "notifyUrl": notify_url,
            "isTest": self.settings.is_test,
            "optional1": request.invoice_id,
            "customer": request.customer_email,
            "hashCheck": hash_check,
        });

        let response = self
            .client
            .post(format!("{}/postpaymentrequest", self.settings.api_base))
            .header("ApiKey", self.settings.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Ozow", e))?;

        let payment: OzowPaymentResponse = read_json("Ozow", response).await?;
        if let Some(error) = payment.error_message.filter(|m| !m.is_empty()) {
            return Err(AppError::Gateway(format!("Ozow: {error}")));
        }

        Ok(PaymentInitiation {
            reference: request.reference.clone(),
            redirect_url: payment.url,
            access_code: payment.payment_request_id,
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification> {
        self.fetch_transaction(reference).await?.into_verification()
    }

    async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookEvent> {
        verify_sha512_hex(self.private_key(), raw_body, signature)?;
        parse_notification(raw_body)
    }

    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult> {
        let transaction = self.fetch_transaction(reference).await?.into_verification()?;
        let transaction_id = transaction
            .transaction_id
            .ok_or_else(|| AppError::Gateway("Ozow: transaction has no id".into()))?;
        let amount = amount_cents.unwrap_or(transaction.amount_cents);

        let response = self
            .client
            .post(format!("{}/secure/refunds/submitrefund", self.settings.api_base))
            .header("ApiKey", self.settings.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&json!({
                "transactionId": transaction_id,
                "amount": format_major_amount(amount),
                "refundReason": format!("Refund {reference}"),
            }))
            .send()
            .await
            .map_err(|e| transport_error("Ozow", e))?;

        let refund: OzowRefundResponse = read_json("Ozow", response).await?;
        if let Some(error) = refund.error_message.filter(|m| !m.is_empty()) {
            return Err(AppError::Gateway(format!("Ozow: {error}")));
        }

        Ok(RefundResult {
            refund_id: refund.refund_id.unwrap_or(transaction_id),
            reference: reference.to_string(),
            amount_cents: Some(amount),
            status: refund
                .refund_status
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "pending".into()),
        })
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        SUPPORTED_CURRENCIES
    }

    fn supported_banks(&self) -> &'static [BankInfo] {
        SUPPORTED_BANKS
    }
}
