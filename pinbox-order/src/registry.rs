use chrono::Utc;
use pinbox_core::credentials::ProviderCredentials;
use pinbox_core::supplier::{BalanceReport, ClientFactory, ProviderClient};
use pinbox_core::CoreError;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::fulfillment::FulfillmentError;
use crate::models::ApiProvider;
use crate::repository::ProviderRepository;

/// A loaded provider record together with its ready-to-use adapter.
#[derive(Clone)]
pub struct ProviderHandle {
    pub provider: ApiProvider,
    pub client: Arc<dyn ProviderClient>,
}

/// Resolves provider ids to adapters.
pub struct ProviderRegistry {
    repo: Arc<dyn ProviderRepository>,
    factory: Arc<dyn ClientFactory>,
}

impl ProviderRegistry {
    pub fn new(repo: Arc<dyn ProviderRepository>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { repo, factory }
    }

    /// Load the provider, parse its credentials and build the adapter.
    /// Inactive providers are refused.
    pub async fn resolve(&self, id: Uuid) -> Result<ProviderHandle, FulfillmentError> {
        let provider = self
            .repo
            .get_provider(id)
            .await?
            .ok_or(FulfillmentError::ProviderNotFound(id))?;

        if !provider.is_active {
            return Err(FulfillmentError::ProviderInactive(id));
        }

        let misconfigured = |e: CoreError| FulfillmentError::Misconfigured { id, reason: e.to_string() };
        let credentials = ProviderCredentials::parse(provider.kind, provider.api_key.expose()).map_err(misconfigured)?;
        let client = self
            .factory
            .build(provider.kind, &provider.base_url, credentials)
            .map_err(misconfigured)?;

        Ok(ProviderHandle { provider, client })
    }

    pub async fn list(&self) -> Result<Vec<ApiProvider>, FulfillmentError> {
        Ok(self.repo.list_providers().await?)
    }

    /// Ask the provider for its current balance and store it on the record.
    pub async fn refresh_balance(&self, id: Uuid) -> Result<BalanceReport, FulfillmentError> {
        let handle = self.resolve(id).await?;
        let report = handle.client.balance().await?;

        self.repo
            .update_balance(id, report.balance, report.currency.as_deref(), Utc::now())
            .await?;

        info!(
            "Provider {} balance refreshed: {} {}",
            handle.provider.name,
            report.balance,
            report.currency.as_deref().unwrap_or("")
        );
        Ok(report)
    }
}
