pub mod app_config;
pub mod database;
pub mod events;
pub mod order_repo;
pub mod provider_repo;
pub mod redis_repo;
pub mod wallet_repo;

pub use database::DbClient;
pub use events::{BroadcastPublisher, LogPublisher};
#[cfg(feature = "kafka")]
pub use events::KafkaPublisher;
pub use order_repo::StoreOrderRepository;
pub use provider_repo::StoreProviderRepository;
pub use redis_repo::RedisClient;
pub use wallet_repo::StoreWalletRepository;
