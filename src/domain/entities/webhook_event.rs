use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{payment::PaymentStatus, payment_provider::PaymentProvider};

/// Provider-independent view of a gateway notification, produced only after
/// the signature has been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: PaymentProvider,
    pub event_type: String,
    /// Reference the payment was initiated with; resolves to an invoice number
    pub reference: String,
    pub transaction_id: Option<String>,
    /// Raw gateway status, lowercased
    pub status: String,
    /// Always minor units, regardless of the gateway's native unit
    pub amount_cents: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
}

impl WebhookEvent {
    /// Deterministic id for deduplicating redeliveries of the same event.
    ///
    /// Built from provider, event type, reference, a disambiguator
    /// (transaction id, else the paid-at timestamp) and the normalized
    /// status. Gateways reuse one event type for every status of a
    /// transaction, so a pending then successful delivery yields two ids.
    pub fn webhook_id(&self) -> String {
        let disambiguator = self
            .transaction_id
            .clone()
            .or_else(|| self.paid_at.map(|t| t.timestamp_millis().to_string()))
            .unwrap_or_default();

        let provider = self.provider.to_string();
        let status = self.payment_status();
        let mut hasher = Sha256::new();
        for part in [
            provider.as_str(),
            self.event_type.as_str(),
            self.reference.as_str(),
            disambiguator.as_str(),
            status.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
        format!("whk_{}", hex::encode(hasher.finalize()))
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_gateway_status(&self.status)
    }

    /// Gateway transaction id, falling back to the reference for gateways
    /// that report none.
    pub fn transaction_key(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or(&self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> WebhookEvent {
        WebhookEvent {
            provider: PaymentProvider::Paystack,
            event_type: "charge.success".into(),
            reference: "INV-202601-00001".into(),
            transaction_id: Some("4099260516".into()),
            status: "success".into(),
            amount_cents: 13_800,
            currency: "NGN".into(),
            paid_at: None,
            customer_email: None,
            failure_reason: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn webhook_id_is_deterministic() {
        assert_eq!(event().webhook_id(), event().webhook_id());
        assert!(event().webhook_id().starts_with("whk_"));
        assert_eq!(event().webhook_id().len(), 4 + 64);
    }

    #[test]
    fn webhook_id_ignores_amount_and_status_spelling() {
        let mut other = event();
        other.amount_cents = 1;
        other.status = "successful".into();
        assert_eq!(event().webhook_id(), other.webhook_id());
    }

    #[test]
    fn webhook_id_changes_with_normalized_status() {
        let mut pending = event();
        pending.status = "pending".into();
        assert_ne!(event().webhook_id(), pending.webhook_id());

        let mut failed = event();
        failed.status = "failed".into();
        assert_ne!(pending.webhook_id(), failed.webhook_id());
    }

    #[test]
    fn webhook_id_changes_with_transaction() {
        let mut other = event();
        other.transaction_id = Some("4099260517".into());
        assert_ne!(event().webhook_id(), other.webhook_id());
    }

    #[test]
    fn webhook_id_changes_with_provider_and_event_type() {
        let mut other = event();
        other.provider = PaymentProvider::Flutterwave;
        assert_ne!(event().webhook_id(), other.webhook_id());

        let mut other = event();
        other.event_type = "refund.processed".into();
        assert_ne!(event().webhook_id(), other.webhook_id());
    }

    #[test]
    fn webhook_id_falls_back_to_paid_at() {
        let mut a = event();
        a.transaction_id = None;
        a.paid_at = Some(Utc::now());
        let mut b = a.clone();
        b.paid_at = a.paid_at.map(|t| t + chrono::Duration::seconds(1));
        assert_ne!(a.webhook_id(), b.webhook_id());
    }

    #[test]
    fn transaction_key_falls_back_to_reference() {
        let mut e = event();
        assert_eq!(e.transaction_key(), "4099260516");
        e.transaction_id = None;
        assert_eq!(e.transaction_key(), "INV-202601-00001");
    }
}
