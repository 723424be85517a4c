use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub providers: ProvidersConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Outbound HTTP settings shared by every provider adapter.
#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Seconds between background sweeps; 0 disables the worker.
    #[serde(default)]
    pub interval_secs: u64,
    pub lock_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EventsConfig {
    pub kafka_brokers: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `PINBOX_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("PINBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
