//! Concrete provider adapters. The rest of the workspace only sees the
//! `ProviderClient` trait from `pinbox-core`; this crate turns a provider
//! record into the matching adapter.

pub mod panel;
pub mod tagged;

use std::sync::Arc;
use std::time::Duration;

use pinbox_core::credentials::ProviderCredentials;
use pinbox_core::supplier::{ClientFactory, ProviderClient, ProviderError, ProviderKind};
use pinbox_core::{CoreError, CoreResult};

pub use panel::PanelClient;
pub use tagged::TaggedClient;

/// Transport settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("pinbox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub fn http_client(settings: &HttpSettings) -> CoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| CoreError::ConfigurationError(format!("http client: {}", e)))
}

/// Build the adapter for one provider. Called once per provider load; the
/// credentials must already match the protocol family.
pub fn build_client(
    kind: ProviderKind,
    base_url: &str,
    credentials: ProviderCredentials,
    http: reqwest::Client,
) -> CoreResult<Arc<dyn ProviderClient>> {
    match (kind, credentials) {
        (ProviderKind::Tagged, ProviderCredentials::UserPass { username, password }) => {
            Ok(Arc::new(TaggedClient::new(http, base_url, username, password)))
        }
        (ProviderKind::Panel, ProviderCredentials::ApiKey(key)) => {
            Ok(Arc::new(PanelClient::new(http, base_url, key)))
        }
        (kind, _) => Err(CoreError::ConfigurationError(format!(
            "credentials do not fit a {} provider",
            kind
        ))),
    }
}

/// `ClientFactory` over a shared `reqwest` connection pool.
#[derive(Clone)]
pub struct HttpClientFactory {
    http: reqwest::Client,
}

impl HttpClientFactory {
    pub fn new(settings: &HttpSettings) -> CoreResult<Self> {
        Ok(Self {
            http: http_client(settings)?,
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(
        &self,
        kind: ProviderKind,
        base_url: &str,
        credentials: ProviderCredentials,
    ) -> CoreResult<Arc<dyn ProviderClient>> {
        build_client(kind, base_url, credentials, self.http.clone())
    }
}

/// Send a form request and hand back the body of a 2xx answer.
pub(crate) async fn post_form(
    http: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, String)],
) -> Result<String, ProviderError> {
    let resp = http
        .post(endpoint)
        .form(form)
        .send()
        .await
        .map_err(transport_error)?;

    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        tracing::warn!("Provider {} answered HTTP {}", endpoint, status.as_u16());
        return Err(ProviderError::Unreachable(format!("HTTP {}", status.as_u16())));
    }

    Ok(body)
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Unreachable("request timed out".to_string())
    } else {
        ProviderError::Unreachable(e.to_string())
    }
}

pub(crate) fn parse_decimal(value: &str) -> Option<rust_decimal::Decimal> {
    value.trim().parse().ok()
}
