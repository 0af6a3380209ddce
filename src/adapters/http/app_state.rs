use std::sync::Arc;

use crate::{
    application::use_cases::{
        checkout::CheckoutUseCases, invoice_generation::InvoiceUseCases,
        provider_registry::ProviderRegistry, webhook_ingest::WebhookUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub webhook_use_cases: Arc<WebhookUseCases>,
    pub invoice_use_cases: Arc<InvoiceUseCases>,
    pub checkout_use_cases: Arc<CheckoutUseCases>,
}
