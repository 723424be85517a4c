use async_trait::async_trait;
use pinbox_core::supplier::{
    BalanceReport, CreatedOrder, ItemSpec, ProviderClient, ProviderError, ProviderKind, RawStatus,
    StatusReport,
};
use pinbox_shared::Masked;
use serde_json::Value;

use crate::{parse_decimal, post_form};

/// Adapter for service panels speaking the `key` / `action` form protocol
/// with JSON replies.
pub struct PanelClient {
    http: reqwest::Client,
    endpoint: String,
    key: Masked<String>,
}

impl PanelClient {
    pub fn new(http: reqwest::Client, endpoint: &str, key: Masked<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            key,
        }
    }

    async fn call(&self, action: &str, extra: Vec<(&str, String)>) -> Result<(Value, String), ProviderError> {
        let mut form = vec![("key", self.key.expose().clone()), ("action", action.to_string())];
        form.extend(extra);

        let raw = post_form(&self.http, &self.endpoint, &form).await?;
        let json: Value = serde_json::from_str(&raw).map_err(|e| ProviderError::Unparseable {
            reason: format!("invalid JSON: {}", e),
            raw: raw.clone(),
        })?;

        if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
            return Err(ProviderError::Rejected {
                code: "error".to_string(),
                message: text(error).unwrap_or_else(|| error.to_string()),
                raw,
            });
        }

        Ok((json, raw))
    }
}

/// Panels are loose about types: ids and amounts arrive as numbers or strings.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field(json: &Value, raw: &str, name: &str) -> Result<String, ProviderError> {
    json.get(name).and_then(text).ok_or_else(|| ProviderError::Unparseable {
        reason: format!("missing {}", name),
        raw: raw.to_string(),
    })
}

#[async_trait]
impl ProviderClient for PanelClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Panel
    }

    fn issues_codes(&self) -> bool {
        false
    }

    async fn create_order(&self, spec: &ItemSpec) -> Result<CreatedOrder, ProviderError> {
        let mut form = vec![
            ("service", spec.product_ref.clone()),
            ("link", spec.target.clone().unwrap_or_default()),
            ("quantity", spec.quantity.to_string()),
        ];
        if let Some(note) = &spec.note {
            form.push(("comments", note.clone()));
        }

        let (json, raw) = self.call("add", form).await?;
        let external_ref = field(&json, &raw, "order")?;

        Ok(CreatedOrder {
            external_ref,
            codes: Vec::new(),
            raw,
        })
    }

    async fn check_status(&self, external_ref: &str) -> Result<StatusReport, ProviderError> {
        let (json, raw) = self.call("status", vec![("order", external_ref.to_string())]).await?;
        let status = field(&json, &raw, "status")?;

        Ok(StatusReport {
            status: RawStatus::Panel(status),
            codes: Vec::new(),
            error_text: None,
            raw,
        })
    }

    async fn balance(&self) -> Result<BalanceReport, ProviderError> {
        let (json, raw) = self.call("balance", Vec::new()).await?;
        let balance = field(&json, &raw, "balance")?;
        let balance = parse_decimal(&balance).ok_or_else(|| ProviderError::Unparseable {
            reason: format!("balance is not a number: {}", balance),
            raw: raw.clone(),
        })?;

        Ok(BalanceReport {
            balance,
            currency: json.get("currency").and_then(text),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loose_field_types() {
        let reply = json!({"order": 23501, "status": " In progress ", "charge": null});
        assert_eq!(field(&reply, "", "order").unwrap(), "23501");
        assert_eq!(field(&reply, "", "status").unwrap(), "In progress");
        assert!(field(&reply, "", "charge").is_err());
    }
}
