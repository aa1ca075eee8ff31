use {
    super::{ProviderEventLogger, paypal::PaypalAdapter, stripe::StripeAdapter, webpay::WebpayAdapter},
    crate::config::Config,
    crate::domain::provider::{ProviderName, ProviderPort},
    std::collections::HashMap,
    std::sync::Arc,
};

/// Lookup table from provider name to adapter. Built once at startup from
/// `Config`; every request borrows an `Arc` rather than constructing a
/// client per call.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderName, Arc<dyn ProviderPort>>,
}

impl ProviderRegistry {
    /// Empty registry, filled in with `insert` — used by tests that stand in
    /// a fake `ProviderPort` instead of talking to a real provider.
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    pub fn insert(&mut self, provider: ProviderName, adapter: Arc<dyn ProviderPort>) {
        self.adapters.insert(provider, adapter);
    }

    pub fn from_config(config: &Config, logger: ProviderEventLogger) -> Self {
        let mut adapters: HashMap<ProviderName, Arc<dyn ProviderPort>> = HashMap::new();

        adapters.insert(
            ProviderName::Webpay,
            Arc::new(WebpayAdapter::new(
                config.tbk_host.clone(),
                config.tbk_api_base.clone(),
                config.tbk_api_key_id.clone(),
                config.tbk_api_key_secret.clone(),
                logger.clone(),
            )),
        );

        adapters.insert(
            ProviderName::Stripe,
            Arc::new(StripeAdapter::new(config.stripe_secret_key.clone(), logger.clone())),
        );

        adapters.insert(
            ProviderName::Paypal,
            Arc::new(PaypalAdapter::new(
                config.paypal_base_url.clone(),
                config.paypal_client_id.clone(),
                config.paypal_client_secret.clone(),
                logger,
            )),
        );

        Self { adapters }
    }

    pub fn get(&self, provider: ProviderName) -> Option<Arc<dyn ProviderPort>> {
        self.adapters.get(&provider).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
