use anyhow::Context;
use pinbox_api::{app, worker, AppState, AuthConfig, Backends};
use pinbox_core::notify::EventPublisher;
use pinbox_provider::{HttpClientFactory, HttpSettings};
use pinbox_store::app_config::Config;
use pinbox_store::{
    BroadcastPublisher, DbClient, RedisClient, StoreOrderRepository, StoreProviderRepository, StoreWalletRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinbox_api=debug,pinbox_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Pinbox API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis only guards sweeps and rate limits; run without it if it is down.
    let redis = match RedisClient::new(&config.redis.url).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Redis unavailable, continuing without it: {}", e);
            None
        }
    };

    let http = HttpSettings {
        timeout: Duration::from_secs(config.providers.request_timeout_secs),
        user_agent: config.providers.user_agent.clone(),
    };

    let backends = Backends {
        orders: Arc::new(StoreOrderRepository::new(db.pool.clone())),
        providers: Arc::new(StoreProviderRepository::new(db.pool.clone())),
        wallet: Arc::new(StoreWalletRepository::new(db.pool.clone())),
        clients: Arc::new(HttpClientFactory::new(&http).context("Failed to build HTTP client")?),
        events: event_publisher(&config)?,
    };

    let state = AppState::new(
        backends,
        redis,
        AuthConfig { secret: config.auth.jwt_secret.clone() },
        config.sync.lock_ttl_secs,
    );

    if config.sync.interval_secs > 0 {
        tokio::spawn(worker::start_delivery_worker(state.clone(), config.sync.interval_secs));
    }

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.events.kafka_brokers {
        Some(brokers) => Ok(Arc::new(
            pinbox_store::KafkaPublisher::new(brokers).context("Failed to create Kafka producer")?,
        )),
        None => Ok(Arc::new(BroadcastPublisher::new(100))),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.events.kafka_brokers.is_some() {
        tracing::warn!("Kafka brokers configured but the `kafka` feature is off; logging events instead");
    }
    Ok(Arc::new(BroadcastPublisher::new(100)))
}
