//! Test app state builder for HTTP-level tests.
//!
//! `TestAppStateBuilder` creates an `AppState` whose use cases run against an
//! `InMemoryBillingStore` and in-memory fakes. A Paystack adapter signed with
//! `PAYSTACK_TEST_SECRET` is always registered so webhook routes can be
//! exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::payment_provider::PaymentProviderPort,
        use_cases::{
            checkout::CheckoutUseCases,
            invoice_generation::{InvoiceSettings, InvoiceUseCases},
            payment_reconciliation::ReconciliationUseCases,
            provider_registry::ProviderRegistry,
            webhook_ingest::WebhookUseCases,
        },
    },
    domain::entities::{invoice::Invoice, subscription::Subscription},
    infra::{
        config::{AppConfig, GatewayCredentials, WalletConfig},
        idempotency::TwoTierIdempotencyStore,
        job_queue::RetryPolicy,
        paystack_adapter::PaystackAdapter,
        scheduler::SchedulerSettings,
    },
    test_utils::{InMemoryBillingStore, InMemorySharedCache, RecordingNotifier, RecordingWallet},
};

pub const PAYSTACK_TEST_SECRET: &str = "sk_test_builder";
const PUBLIC_BASE_URL: &str = "https://billing.example.com";

pub struct TestAppStateBuilder {
    store: Arc<InMemoryBillingStore>,
    providers: Vec<Arc<dyn PaymentProviderPort>>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryBillingStore::new()),
            providers: Vec::new(),
        }
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.store.insert_subscription(subscription);
        self
    }

    pub fn with_invoice(self, invoice: Invoice) -> Self {
        self.store.insert_invoice(invoice);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProviderPort>) -> Self {
        self.providers.push(provider);
        self
    }

    /// The store the built state reads from and writes to.
    pub fn store(&self) -> Arc<InMemoryBillingStore> {
        self.store.clone()
    }

    pub fn build(self) -> AppState {
        let TestAppStateBuilder { store, providers } = self;

        let mut registry = ProviderRegistry::new().with(Arc::new(PaystackAdapter::new(
            SecretString::new(PAYSTACK_TEST_SECRET.into()),
            "http://127.0.0.1:9".to_string(),
        )));
        for provider in providers {
            registry.register(provider);
        }
        let registry = Arc::new(registry);

        let notifier = Arc::new(RecordingNotifier::new());
        let invoice_use_cases = Arc::new(InvoiceUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            InvoiceSettings::default(),
        ));
        let reconciler = Arc::new(ReconciliationUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(RecordingWallet::new()),
            notifier,
            registry.clone(),
            chrono::Duration::minutes(30),
        ));
        let idempotency = Arc::new(TwoTierIdempotencyStore::new(
            Arc::new(InMemorySharedCache::new()),
            Duration::from_secs(24 * 60 * 60),
        ));
        let webhook_use_cases = Arc::new(WebhookUseCases::new(
            registry.clone(),
            idempotency,
            reconciler,
        ));
        let checkout_use_cases = Arc::new(CheckoutUseCases::new(
            store.clone(),
            store,
            registry.clone(),
            PUBLIC_BASE_URL.to_string(),
        ));

        AppState {
            config: Arc::new(test_config()),
            registry,
            webhook_use_cases,
            invoice_use_cases,
            checkout_use_cases,
        }
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://localhost/billing_test".to_string(),
        database_max_connections: 1,
        redis_url: "redis://127.0.0.1:6379".to_string(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        public_base_url: Url::parse(PUBLIC_BASE_URL).unwrap(),
        invoice: InvoiceSettings::default(),
        scheduler: SchedulerSettings::default(),
        job_retry: RetryPolicy::default(),
        job_lock_ttl: Duration::from_secs(60),
        webhook_retention: Duration::from_secs(24 * 60 * 60),
        pending_verify_after: chrono::Duration::minutes(30),
        wallet: WalletConfig {
            url: Url::parse("http://127.0.0.1:9").unwrap(),
            api_key: SecretString::new("wallet_test_key".into()),
        },
        notification_url: None,
        gateways: GatewayCredentials::default(),
    }
}
