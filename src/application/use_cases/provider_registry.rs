use std::{collections::HashMap, str::FromStr, sync::Arc};

use serde::Serialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{BankInfo, PaymentProviderPort},
    domain::entities::payment_provider::PaymentProvider,
};

/// Registry of configured gateway adapters.
///
/// This is the only place a provider name is turned into an adapter:
/// webhook ingress, checkout and the pending-payment sweep all resolve here.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<PaymentProvider, Arc<dyn PaymentProviderPort>>,
}

/// Public description of a configured provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub provider: PaymentProvider,
    pub display_name: &'static str,
    pub currencies: &'static [&'static str],
    pub banks: &'static [BankInfo],
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the provider it reports. Replaces any previous one.
    pub fn register(&mut self, adapter: Arc<dyn PaymentProviderPort>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PaymentProviderPort>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapter for a known provider.
    ///
    /// # Errors
    /// - `ProviderNotConfigured` if no credentials were supplied for it
    pub fn get(&self, provider: PaymentProvider) -> AppResult<Arc<dyn PaymentProviderPort>> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| AppError::ProviderNotConfigured(provider.to_string()))
    }

    /// Adapter for a provider name taken from a request.
    ///
    /// # Errors
    /// - `UnknownProvider` if the name matches no provider
    /// - `ProviderNotConfigured` if the provider exists but is not set up
    pub fn resolve(&self, name: &str) -> AppResult<Arc<dyn PaymentProviderPort>> {
        let provider = PaymentProvider::from_str(name.trim())
            .map_err(|_| AppError::UnknownProvider(name.to_string()))?;
        self.get(provider)
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Configured providers in a stable order
    pub fn configured(&self) -> Vec<PaymentProvider> {
        PaymentProvider::all()
            .iter()
            .copied()
            .filter(|p| self.is_configured(*p))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.configured()
            .into_iter()
            .filter_map(|p| self.adapters.get(&p))
            .map(|adapter| {
                let provider = adapter.provider();
                ProviderSummary {
                    provider,
                    display_name: provider.display_name(),
                    currencies: adapter.supported_currencies(),
                    banks: adapter.supported_banks(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StubPaymentProvider;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new()
            .with(Arc::new(StubPaymentProvider::new(PaymentProvider::Ozow)))
            .with(Arc::new(StubPaymentProvider::new(PaymentProvider::Paystack)))
    }

    #[test]
    fn test_resolve_known_provider_is_case_insensitive() {
        let adapter = registry().resolve("PayStack").unwrap();
        assert_eq!(adapter.provider(), PaymentProvider::Paystack);
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let err = registry().resolve("stripe").err().unwrap();
        assert!(matches!(err, AppError::UnknownProvider(name) if name == "stripe"));
    }

    #[test]
    fn test_resolve_unconfigured_provider() {
        let err = registry().resolve("flutterwave").err().unwrap();
        assert!(matches!(err, AppError::ProviderNotConfigured(_)));
    }

    #[test]
    fn test_configured_order_is_stable() {
        assert_eq!(
            registry().configured(),
            vec![PaymentProvider::Paystack, PaymentProvider::Ozow]
        );
    }

    #[test]
    fn test_summaries_expose_currencies() {
        let summaries = registry().summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].display_name, "Paystack");
        assert!(!summaries[0].currencies.is_empty());
    }
}
