use std::{fs::File, sync::Arc};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{
        http::app_state::AppState, notifications::webhook_notifier::WebhookNotifier,
        persistence::PostgresPersistence, wallet::http_wallet::HttpWalletClient,
    },
    application::{
        ports::{
            distributed_lock::DistributedLock, idempotency::IdempotencyStore,
            job_queue::JobHandler, notifications::NotificationDispatcher,
            shared_cache::SharedCache, wallet::WalletPort,
        },
        use_cases::{
            billing::{InvoiceRepo, PaymentRepo, SubscriptionRepo, UsageRepo},
            billing_jobs::BillingJobRunner,
            checkout::CheckoutUseCases,
            invoice_generation::InvoiceUseCases,
            payment_reconciliation::ReconciliationUseCases,
            provider_registry::ProviderRegistry,
            webhook_ingest::WebhookUseCases,
        },
    },
    infra::{
        config::{AppConfig, GatewayCredentials},
        db::init_db,
        flutterwave_adapter::FlutterwaveAdapter,
        idempotency::TwoTierIdempotencyStore,
        job_queue::InProcessJobQueue,
        ozow_adapter::OzowAdapter,
        payfast_adapter::PayfastAdapter,
        paystack_adapter::PaystackAdapter,
        redis_cache::RedisSharedCache,
        scheduler::BillingScheduler,
    },
};

/// Everything `main` needs: the HTTP state and the background scheduler.
pub struct AppServices {
    pub app_state: AppState,
    pub scheduler: BillingScheduler,
}

pub fn build_registry(gateways: GatewayCredentials) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    if let Some(paystack) = gateways.paystack {
        registry.register(Arc::new(PaystackAdapter::new(
            paystack.secret_key,
            paystack.base_url,
        )));
    }
    if let Some(flutterwave) = gateways.flutterwave {
        registry.register(Arc::new(FlutterwaveAdapter::new(
            flutterwave.secret_key,
            flutterwave.secret_hash,
            flutterwave.base_url,
        )));
    }
    if let Some(payfast) = gateways.payfast {
        registry.register(Arc::new(PayfastAdapter::new(payfast)));
    }
    if let Some(ozow) = gateways.ozow {
        registry.register(Arc::new(OzowAdapter::new(ozow)));
    }

    if registry.configured().is_empty() {
        warn!("No payment gateways configured; webhooks will be rejected");
    } else {
        info!(providers = ?registry.configured(), "Payment gateways configured");
    }
    registry
}

pub async fn init_app_state() -> anyhow::Result<AppServices> {
    let mut config = AppConfig::from_env()?;

    let pool = init_db(&config.database_url, config.database_max_connections).await?;
    let postgres = Arc::new(PostgresPersistence::new(pool));
    let subscription_repo = postgres.clone() as Arc<dyn SubscriptionRepo>;
    let usage_repo = postgres.clone() as Arc<dyn UsageRepo>;
    let invoice_repo = postgres.clone() as Arc<dyn InvoiceRepo>;
    let payment_repo = postgres.clone() as Arc<dyn PaymentRepo>;

    let cache = Arc::new(RedisSharedCache::new(&config.redis_url).await?) as Arc<dyn SharedCache>;
    let idempotency = Arc::new(TwoTierIdempotencyStore::new(
        cache.clone(),
        config.webhook_retention,
    )) as Arc<dyn IdempotencyStore>;

    let registry = Arc::new(build_registry(std::mem::take(&mut config.gateways)));
    let wallet = Arc::new(HttpWalletClient::new(&config.wallet)) as Arc<dyn WalletPort>;
    let notifier = Arc::new(WebhookNotifier::new(config.notification_url.clone()))
        as Arc<dyn NotificationDispatcher>;

    let invoice_use_cases = Arc::new(InvoiceUseCases::new(
        subscription_repo.clone(),
        usage_repo,
        invoice_repo.clone(),
        notifier.clone(),
        config.invoice.clone(),
    ));

    let reconciliation_use_cases = Arc::new(ReconciliationUseCases::new(
        invoice_repo.clone(),
        payment_repo,
        subscription_repo.clone(),
        wallet,
        notifier,
        registry.clone(),
        config.pending_verify_after,
    ));

    let webhook_use_cases = Arc::new(WebhookUseCases::new(
        registry.clone(),
        idempotency.clone(),
        reconciliation_use_cases.clone(),
    ));

    let checkout_use_cases = Arc::new(CheckoutUseCases::new(
        invoice_repo,
        subscription_repo,
        registry.clone(),
        config.public_base_url.to_string(),
    ));

    let job_runner = Arc::new(BillingJobRunner::new(
        invoice_use_cases.clone(),
        reconciliation_use_cases,
        DistributedLock::new(cache),
        config.job_lock_ttl,
    )) as Arc<dyn JobHandler>;
    let (queue, _worker) = InProcessJobQueue::start(job_runner, config.job_retry);

    let scheduler = BillingScheduler::new(Arc::new(queue), idempotency, config.scheduler.clone());

    Ok(AppServices {
        app_state: AppState {
            config: Arc::new(config),
            registry,
            webhook_use_cases,
            invoice_use_cases,
            checkout_use_cases,
        },
        scheduler,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billing_recon=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs); console only if the file cannot be created
    let json_layer = match File::create("app.log") {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true),
        ),
        Err(e) => {
            eprintln!("cannot create app.log, logging to console only: {e}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
