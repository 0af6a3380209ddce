use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment gateway that can settle an invoice
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentProvider {
    Paystack,
    Flutterwave,
    Payfast,
    Ozow,
}

/// How a provider encodes its webhook bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookBodyFormat {
    Json,
    FormUrlEncoded,
}

impl PaymentProvider {
    /// Human-readable display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentProvider::Paystack => "Paystack",
            PaymentProvider::Flutterwave => "Flutterwave",
            PaymentProvider::Payfast => "PayFast",
            PaymentProvider::Ozow => "Ozow",
        }
    }

    /// Header carrying the webhook HMAC signature
    pub fn signature_header(&self) -> &'static str {
        match self {
            PaymentProvider::Paystack => "x-paystack-signature",
            PaymentProvider::Flutterwave => "flutterwave-signature",
            PaymentProvider::Payfast => "x-payfast-signature",
            PaymentProvider::Ozow => "x-ozow-signature",
        }
    }

    pub fn webhook_body_format(&self) -> WebhookBodyFormat {
        match self {
            PaymentProvider::Paystack | PaymentProvider::Flutterwave => WebhookBodyFormat::Json,
            PaymentProvider::Payfast | PaymentProvider::Ozow => WebhookBodyFormat::FormUrlEncoded,
        }
    }

    /// All known providers
    pub fn all() -> &'static [PaymentProvider] {
        &[
            PaymentProvider::Paystack,
            PaymentProvider::Flutterwave,
            PaymentProvider::Payfast,
            PaymentProvider::Ozow,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display() {
        assert_eq!(PaymentProvider::Paystack.to_string(), "paystack");
        assert_eq!(PaymentProvider::Payfast.to_string(), "payfast");
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(
            PaymentProvider::from_str("Flutterwave").unwrap(),
            PaymentProvider::Flutterwave
        );
        assert_eq!(PaymentProvider::from_str("OZOW").unwrap(), PaymentProvider::Ozow);
        assert!(PaymentProvider::from_str("stripe").is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&PaymentProvider::Paystack).unwrap();
        assert_eq!(json, "\"paystack\"");
        let parsed: PaymentProvider = serde_json::from_str("\"ozow\"").unwrap();
        assert_eq!(parsed, PaymentProvider::Ozow);
    }

    #[test]
    fn test_body_formats() {
        assert_eq!(
            PaymentProvider::Paystack.webhook_body_format(),
            WebhookBodyFormat::Json
        );
        assert_eq!(
            PaymentProvider::Ozow.webhook_body_format(),
            WebhookBodyFormat::FormUrlEncoded
        );
    }

    #[test]
    fn test_all_has_unique_signature_headers() {
        let mut headers: Vec<_> = PaymentProvider::all()
            .iter()
            .map(|p| p.signature_header())
            .collect();
        headers.sort();
        headers.dedup();
        assert_eq!(headers.len(), PaymentProvider::all().len());
    }
}
