use std::{str::FromStr, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::idempotency::{IdempotencyStore, ProcessedWebhook},
    domain::entities::payment_provider::PaymentProvider,
};

use super::{
    payment_reconciliation::{ReconcileOutcome, ReconciliationUseCases},
    provider_registry::ProviderRegistry,
};

/// Header a gateway-agnostic sender uses to name the provider
pub const PROVIDER_HEADER: &str = "x-payment-provider";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed {
        webhook_id: String,
        result: ReconcileOutcome,
    },
    Duplicate {
        webhook_id: String,
    },
    /// Verified but refused by billing rules; acknowledged so it is not redelivered
    Rejected {
        webhook_id: String,
        reason: String,
    },
}

pub struct WebhookUseCases {
    registry: Arc<ProviderRegistry>,
    idempotency: Arc<dyn IdempotencyStore>,
    reconciler: Arc<ReconciliationUseCases>,
}

impl WebhookUseCases {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        idempotency: Arc<dyn IdempotencyStore>,
        reconciler: Arc<ReconciliationUseCases>,
    ) -> Self {
        Self {
            registry,
            idempotency,
            reconciler,
        }
    }

    /// Verify, dedupe and reconcile one webhook delivery.
    ///
    /// Order matters: the signature is checked before anything is parsed, and
    /// the webhook is marked processed only after reconciliation committed.
    pub async fn ingest(
        &self,
        provider_name: &str,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<IngestOutcome> {
        let adapter = self.registry.resolve(provider_name)?;
        let event = adapter.process_webhook(raw_body, signature).await?;
        let webhook_id = event.webhook_id();

        if self.idempotency.is_processed(&webhook_id).await? {
            debug!(%webhook_id, provider = %event.provider, "Duplicate webhook, skipping");
            return Ok(IngestOutcome::Duplicate { webhook_id });
        }

        let record = ProcessedWebhook {
            webhook_id: webhook_id.clone(),
            provider: event.provider,
            event_type: event.event_type.clone(),
            reference: event.reference.clone(),
            processed_at: Utc::now(),
        };

        let result = match self.reconciler.apply_event(&event).await {
            Ok(result) => result,
            Err(e @ (AppError::AlreadyPaidInvoice | AppError::InvoiceVoid)) => {
                self.idempotency.mark_processed(record).await?;
                return Ok(IngestOutcome::Rejected {
                    webhook_id,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        // Unknown references leave no trace so a later redelivery can still land.
        if result != ReconcileOutcome::InvoiceNotFound {
            self.idempotency.mark_processed(record).await?;
        }

        info!(
            %webhook_id,
            provider = %event.provider,
            event_type = %event.event_type,
            reference = %event.reference,
            "Processed webhook"
        );
        Ok(IngestOutcome::Processed { webhook_id, result })
    }
}

/// Resolve the provider for the gateway-agnostic endpoint: the
/// `x-payment-provider` header wins, then a `provider` field in a JSON or
/// form-encoded body.
pub fn detect_provider(header: Option<&str>, raw_body: &[u8]) -> AppResult<PaymentProvider> {
    let name = match header.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => h.to_string(),
        None => provider_field(raw_body)
            .ok_or_else(|| AppError::UnknownProvider("<missing>".to_string()))?,
    };
    PaymentProvider::from_str(&name).map_err(|_| AppError::UnknownProvider(name))
}

fn provider_field(raw_body: &[u8]) -> Option<String> {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(raw_body) {
        return json
            .get("provider")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }
    url::form_urlencoded::parse(raw_body)
        .find(|(k, _)| k == "provider")
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod webhook_ingest_tests {
    use super::*;
    use crate::{
        application::use_cases::billing::PaymentRepo,
        domain::entities::{invoice::InvoiceStatus, payment::PaymentStatus},
        infra::{
            flutterwave_adapter::FlutterwaveAdapter,
            idempotency::TwoTierIdempotencyStore,
            paystack_adapter::PaystackAdapter,
            webhook_signature::{hmac_sha256_base64, hmac_sha512_hex},
        },
        test_utils::{
            InMemoryBillingStore, InMemorySharedCache, RecordingNotifier, RecordingWallet,
            create_test_invoice,
        },
    };
    use chrono::Duration;
    use secrecy::SecretString;

    const SECRET: &str = "sk_test_paystack";
    const FLW_HASH: &str = "flw_test_hash";

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        wallet: Arc<RecordingWallet>,
        use_cases: WebhookUseCases,
    }

    fn fixture(store: InMemoryBillingStore) -> Fixture {
        let store = Arc::new(store);
        let wallet = Arc::new(RecordingWallet::new());
        let registry = Arc::new(
            ProviderRegistry::new()
                .with(Arc::new(PaystackAdapter::new(
                    SecretString::new(SECRET.into()),
                    "http://127.0.0.1:9".to_string(),
                )))
                .with(Arc::new(FlutterwaveAdapter::new(
                    SecretString::new("FLWSECK_TEST-key".into()),
                    SecretString::new(FLW_HASH.into()),
                    "http://127.0.0.1:9".to_string(),
                ))),
        );
        let reconciler = Arc::new(ReconciliationUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            wallet.clone(),
            Arc::new(RecordingNotifier::new()),
            registry.clone(),
            Duration::minutes(30),
        ));
        let idempotency = Arc::new(TwoTierIdempotencyStore::new(
            Arc::new(InMemorySharedCache::new()),
            std::time::Duration::from_secs(86_400),
        ));
        Fixture {
            store,
            wallet,
            use_cases: WebhookUseCases::new(registry, idempotency, reconciler),
        }
    }

    fn charge_success(reference: &str, amount_kobo: i64) -> Vec<u8> {
        serde_json::json!({
            "event": "charge.success",
            "data": {
                "id": 4099260516u64,
                "reference": reference,
                "status": "success",
                "amount": amount_kobo,
                "currency": "NGN",
                "paid_at": "2026-02-01T10:00:00.000Z",
                "customer": { "email": "billing@example.com" }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn flutterwave_charge(reference: &str, status: &str, amount: &str) -> Vec<u8> {
        serde_json::json!({
            "event": "charge.completed",
            "data": {
                "id": 9001,
                "tx_ref": reference,
                "status": status,
                "amount": amount,
                "currency": "ZAR",
                "created_at": "2026-02-01T10:00:00.000Z",
                "customer": { "email": "billing@example.com" }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_replayed_webhook_records_one_payment() {
        let invoice = create_test_invoice(|i| {
            i.status = InvoiceStatus::Sent;
            i.total_cents = 13_800;
        });
        let f = fixture(InMemoryBillingStore::new().with_invoices(vec![invoice.clone()]));
        let body = charge_success(&invoice.invoice_number, 13_800);
        let signature = hmac_sha512_hex(SECRET.as_bytes(), &body);

        let first = f
            .use_cases
            .ingest("paystack", &body, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Processed { .. }));

        for _ in 0..5 {
            let again = f
                .use_cases
                .ingest("paystack", &body, Some(&signature))
                .await
                .unwrap();
            assert!(matches!(again, IngestOutcome::Duplicate { .. }));
        }

        assert_eq!(f.store.list_for_invoice(invoice.id).await.unwrap().len(), 1);
        assert_eq!(f.store.invoice(invoice.id).status, InvoiceStatus::Paid);
        assert_eq!(f.wallet.credits().len(), 1);
    }

    #[tokio::test]
    async fn test_status_progression_on_same_transaction_is_applied() {
        let invoice = create_test_invoice(|i| {
            i.status = InvoiceStatus::Sent;
            i.total_cents = 13_800;
        });
        let f = fixture(InMemoryBillingStore::new().with_invoices(vec![invoice.clone()]));

        let pending = flutterwave_charge(&invoice.invoice_number, "pending", "138.00");
        let signature = hmac_sha256_base64(FLW_HASH.as_bytes(), &pending);
        let first = f
            .use_cases
            .ingest("flutterwave", &pending, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Processed { .. }));
        assert_eq!(f.store.invoice(invoice.id).status, InvoiceStatus::Sent);

        let successful = flutterwave_charge(&invoice.invoice_number, "successful", "138.00");
        let signature = hmac_sha256_base64(FLW_HASH.as_bytes(), &successful);
        let second = f
            .use_cases
            .ingest("flutterwave", &successful, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Processed { .. }));

        let payments = f.store.payments_for(invoice.id);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].provider_transaction_id, "9001");
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(f.store.invoice(invoice.id).status, InvoiceStatus::Paid);

        // Redelivery of the successful event is still a duplicate
        let again = f
            .use_cases
            .ingest("flutterwave", &successful, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(again, IngestOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_invalid_signature_has_no_side_effects() {
        let invoice = create_test_invoice(|i| i.status = InvoiceStatus::Sent);
        let f = fixture(InMemoryBillingStore::new().with_invoices(vec![invoice.clone()]));
        let body = charge_success(&invoice.invoice_number, 13_800);
        let signature = hmac_sha512_hex(b"wrong-secret", &body);

        let err = f
            .use_cases
            .ingest("paystack", &body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));

        let err = f
            .use_cases
            .ingest("paystack", &body, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));

        assert!(f.store.payments_for(invoice.id).is_empty());
        assert_eq!(f.store.invoice(invoice.id).status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let f = fixture(InMemoryBillingStore::new());
        let err = f.use_cases.ingest("stripe", b"{}", Some("sig")).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_marked_processed() {
        let f = fixture(InMemoryBillingStore::new());
        let body = charge_success("INV-209901-00001", 100);
        let signature = hmac_sha512_hex(SECRET.as_bytes(), &body);

        for _ in 0..2 {
            let outcome = f
                .use_cases
                .ingest("paystack", &body, Some(&signature))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                IngestOutcome::Processed {
                    result: ReconcileOutcome::InvoiceNotFound,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_payment_on_paid_invoice_is_rejected_once() {
        let invoice = create_test_invoice(|i| i.status = InvoiceStatus::Paid);
        let f = fixture(InMemoryBillingStore::new().with_invoices(vec![invoice.clone()]));
        let body = charge_success(&invoice.invoice_number, 500);
        let signature = hmac_sha512_hex(SECRET.as_bytes(), &body);

        let first = f
            .use_cases
            .ingest("paystack", &body, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Rejected { .. }));

        let second = f
            .use_cases
            .ingest("paystack", &body, Some(&signature))
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
    }

    #[test]
    fn test_detect_provider_prefers_header() {
        let body = br#"{"provider":"flutterwave"}"#;
        assert_eq!(
            detect_provider(Some("Paystack"), body).unwrap(),
            PaymentProvider::Paystack
        );
    }

    #[test]
    fn test_detect_provider_from_json_and_form_bodies() {
        assert_eq!(
            detect_provider(None, br#"{"provider":"flutterwave","data":{}}"#).unwrap(),
            PaymentProvider::Flutterwave
        );
        assert_eq!(
            detect_provider(None, b"m_payment_id=INV-1&provider=payfast").unwrap(),
            PaymentProvider::Payfast
        );
    }

    #[test]
    fn test_detect_provider_missing_or_unknown() {
        assert!(matches!(
            detect_provider(None, b"{}"),
            Err(AppError::UnknownProvider(_))
        ));
        assert!(matches!(
            detect_provider(Some("stripe"), b""),
            Err(AppError::UnknownProvider(name)) if name == "stripe"
        ));
    }
}
