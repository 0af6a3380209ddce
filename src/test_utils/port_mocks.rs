//! Fakes for the non-persistence ports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        notifications::{Notification, NotificationDispatcher},
        payment_provider::{
            BankInfo, PaymentInitiation, PaymentProviderPort, PaymentRequest, PaymentVerification,
            RefundResult,
        },
        shared_cache::SharedCache,
        wallet::{WalletCredit, WalletPort},
    },
    domain::entities::{payment_provider::PaymentProvider, webhook_event::WebhookEvent},
};

// ============================================================================
// InMemorySharedCache
// ============================================================================

/// `SharedCache` with real expiry, standing in for Redis.
#[derive(Default)]
pub struct InMemorySharedCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unexpired value, bypassing the trait.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        Self::live(&mut entries, key).cloned()
    }

    /// Overwrite a key without expiry, e.g. to simulate another instance.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), None));
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, (String, Option<Instant>)>,
        key: &str,
    ) -> Option<&'a String> {
        let expired = entries
            .get(key)
            .is_some_and(|(_, expires_at)| expires_at.is_some_and(|at| at <= Instant::now()));
        if expired {
            entries.remove(key);
        }
        entries.get(key).map(|(value, _)| value)
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.get_raw(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }
}

// ============================================================================
// Notifications and wallet
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Kinds in send order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|n| n.kind()).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

#[derive(Default)]
pub struct RecordingWallet {
    credits: Mutex<Vec<WalletCredit>>,
}

impl RecordingWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credits(&self) -> Vec<WalletCredit> {
        self.credits.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletPort for RecordingWallet {
    async fn credit(&self, credit: &WalletCredit) -> AppResult<()> {
        self.credits.lock().unwrap().push(credit.clone());
        Ok(())
    }
}

/// Wallet whose service is always down.
pub struct FailingWallet;

#[async_trait]
impl WalletPort for FailingWallet {
    async fn credit(&self, _credit: &WalletCredit) -> AppResult<()> {
        Err(AppError::Gateway("wallet returned 503 Service Unavailable".into()))
    }
}

// ============================================================================
// StubPaymentProvider
// ============================================================================

const STUB_CURRENCIES: &[&str] = &["ZAR", "NGN", "USD"];
const STUB_BANKS: &[BankInfo] = &[BankInfo {
    code: "TEST",
    name: "Test Bank",
}];

/// Gateway that records payment requests and answers verification from a
/// canned result. Webhooks are not supported.
pub struct StubPaymentProvider {
    provider: PaymentProvider,
    verification: Option<PaymentVerification>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl StubPaymentProvider {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            verification: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verification(mut self, verification: PaymentVerification) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn payment_requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProviderPort for StubPaymentProvider {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_payment(&self, request: &PaymentRequest) -> AppResult<PaymentInitiation> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(PaymentInitiation {
            reference: request.reference.clone(),
            redirect_url: Some(format!(
                "https://checkout.example.com/{}/{}",
                self.provider, request.reference
            )),
            access_code: None,
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<PaymentVerification> {
        self.verification
            .clone()
            .filter(|v| v.reference == reference)
            .ok_or(AppError::NotFound)
    }

    async fn process_webhook(
        &self,
        _raw_body: &[u8],
        _signature: Option<&str>,
    ) -> AppResult<WebhookEvent> {
        Err(AppError::InvalidSignature)
    }

    async fn refund_payment(
        &self,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<RefundResult> {
        Ok(RefundResult {
            refund_id: format!("rf_{reference}"),
            reference: reference.to_string(),
            amount_cents,
            status: "pending".to_string(),
        })
    }

    fn supported_currencies(&self) -> &'static [&'static str] {
        STUB_CURRENCIES
    }

    fn supported_banks(&self) -> &'static [BankInfo] {
        STUB_BANKS
    }
}
