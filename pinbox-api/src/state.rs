use pinbox_core::notify::EventPublisher;
use pinbox_core::supplier::ClientFactory;
use pinbox_order::repository::{OrderRepository, ProviderRepository, WalletRepository};
use pinbox_order::{DeliverySynchronizer, FulfillmentService, ProviderRegistry, WalletLedgerService};
use pinbox_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub wallet: Arc<WalletLedgerService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub sync: Arc<DeliverySynchronizer>,
    pub providers: Arc<ProviderRegistry>,
    /// Sweep lock and rate limiting; both are skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub sweep_lock_ttl: u64,
}

/// Storage and integration ports the services are built from.
pub struct Backends {
    pub orders: Arc<dyn OrderRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub wallet: Arc<dyn WalletRepository>,
    pub clients: Arc<dyn ClientFactory>,
    pub events: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(backends: Backends, redis: Option<Arc<RedisClient>>, auth: AuthConfig, sweep_lock_ttl: u64) -> Self {
        let registry = Arc::new(ProviderRegistry::new(backends.providers, backends.clients));

        Self {
            wallet: Arc::new(WalletLedgerService::new(backends.wallet, backends.events.clone())),
            fulfillment: Arc::new(FulfillmentService::new(
                backends.orders.clone(),
                registry.clone(),
                backends.events.clone(),
            )),
            sync: Arc::new(DeliverySynchronizer::new(backends.orders, registry.clone(), backends.events)),
            providers: registry,
            redis,
            auth,
            sweep_lock_ttl,
        }
    }
}
