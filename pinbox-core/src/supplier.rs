use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::credentials::ProviderCredentials;
use crate::delivery::DeliveredCode;
use crate::{CoreError, CoreResult};

/// Which wire protocol family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Tag-delimited epin/top-up protocol.
    Tagged,
    /// Form-encoded `action` protocol of service panels.
    Panel,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Tagged => "tagged",
            ProviderKind::Panel => "panel",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tagged" | "epin" => Ok(ProviderKind::Tagged),
            "panel" | "smm" => Ok(ProviderKind::Panel),
            other => Err(CoreError::ConfigurationError(format!("unknown provider kind: {}", other))),
        }
    }
}

/// Provider-neutral description of what to order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
    /// Provider product code (tag protocol) or service id (panel).
    pub product_ref: String,
    /// Game/category code; only the tag protocol uses it.
    pub category_ref: Option<String>,
    pub quantity: u32,
    /// Player id, character name or profile link.
    pub target: Option<String>,
    pub note: Option<String>,
    pub pre_order: bool,
    pub tier: Option<String>,
}

/// Normalized reply to `create_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub external_ref: String,
    pub codes: Vec<DeliveredCode>,
    pub raw: String,
}

/// Provider status in the provider's own vocabulary; mapping it to the
/// internal delivery status is the status mapper's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "value", rename_all = "snake_case")]
pub enum RawStatus {
    TagCode(String),
    Panel(String),
}

/// Normalized reply to `check_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RawStatus,
    pub codes: Vec<DeliveredCode>,
    pub error_text: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub balance: Decimal,
    pub currency: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, timeout or non-2xx answer.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// Business error code inside an otherwise successful response.
    #[error("provider rejected the request ({code}): {message}")]
    Rejected {
        code: String,
        message: String,
        raw: String,
    },

    #[error("provider response unparseable: {reason}")]
    Unparseable { reason: String, raw: String },
}

impl ProviderError {
    /// Terminal errors fail the item; unreachable providers are retried later.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProviderError::Unreachable(_))
    }

    /// Text stored in `delivery_error` for support review.
    pub fn support_message(&self) -> String {
        match self {
            ProviderError::Unreachable(reason) => format!("Provider unreachable: {}", reason),
            ProviderError::Rejected { code, message, .. } => format!("{} (code {})", message, code),
            ProviderError::Unparseable { .. } => {
                "Provider returned an unreadable response".to_string()
            }
        }
    }

    /// Structured detail kept in the item's response log.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            ProviderError::Unreachable(reason) => serde_json::json!({
                "kind": "unreachable",
                "reason": reason,
            }),
            ProviderError::Rejected { code, message, raw } => serde_json::json!({
                "kind": "rejected",
                "code": code,
                "message": message,
                "raw": raw,
            }),
            ProviderError::Unparseable { reason, raw } => serde_json::json!({
                "kind": "unparseable",
                "reason": reason,
                "raw": raw,
            }),
        }
    }
}

/// One adapter per protocol family, bound to a single provider's base URL and
/// credentials when the provider record is loaded.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether a completed order hands out redeemable codes.
    fn issues_codes(&self) -> bool;

    async fn create_order(&self, spec: &ItemSpec) -> Result<CreatedOrder, ProviderError>;

    async fn check_status(&self, external_ref: &str) -> Result<StatusReport, ProviderError>;

    async fn balance(&self) -> Result<BalanceReport, ProviderError>;
}

/// Selects and builds the adapter for a provider's protocol family.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        kind: ProviderKind,
        base_url: &str,
        credentials: ProviderCredentials,
    ) -> CoreResult<Arc<dyn ProviderClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Tagged".parse::<ProviderKind>().unwrap(), ProviderKind::Tagged);
        assert_eq!("smm".parse::<ProviderKind>().unwrap(), ProviderKind::Panel);
        assert!("soap".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_unparseable_uses_generic_message() {
        let err = ProviderError::Unparseable {
            reason: "missing RESULT_CODE".to_string(),
            raw: "<html>".to_string(),
        };
        assert!(err.is_terminal());
        assert_eq!(err.support_message(), "Provider returned an unreadable response");
        assert_eq!(err.detail()["kind"], "unparseable");
    }

    #[test]
    fn test_unreachable_is_retryable() {
        assert!(!ProviderError::Unreachable("timeout".to_string()).is_terminal());
    }
}
