use async_trait::async_trait;
use pinbox_core::delivery::extract_epin_blocks;
use pinbox_core::scrape::{escape, first_tag};
use pinbox_core::supplier::{
    BalanceReport, CreatedOrder, ItemSpec, ProviderClient, ProviderError, ProviderKind, RawStatus,
    StatusReport,
};
use pinbox_shared::Masked;

use crate::{parse_decimal, post_form};

const CMD_ORDER: &str = "epinOrder";
const CMD_STATUS: &str = "orderStatus";
const CMD_BALANCE: &str = "balance";

/// Adapter for the tag-delimited epin/top-up protocol.
///
/// Requests are a `<APIRequest><params>…</params></APIRequest>` document sent
/// as the single form field `DATA`. Replies are scraped tag by tag.
pub struct TaggedClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: Masked<String>,
}

impl TaggedClient {
    pub fn new(http: reqwest::Client, endpoint: &str, username: String, password: Masked<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            username,
            password,
        }
    }

    fn document(&self, cmd: &str, params: &[(&str, String)]) -> String {
        let mut doc = String::from("<APIRequest><params>");
        doc.push_str(&format!("<cmd>{}</cmd>", cmd));
        doc.push_str(&format!("<username>{}</username>", escape(&self.username)));
        doc.push_str(&format!("<password>{}</password>", escape(self.password.expose())));
        for (name, value) in params {
            doc.push_str(&format!("<{0}>{1}</{0}>", name, escape(value)));
        }
        doc.push_str("</params></APIRequest>");
        doc
    }

    async fn call(&self, cmd: &str, params: &[(&str, String)]) -> Result<String, ProviderError> {
        let form = [("DATA", self.document(cmd, params))];
        let raw = post_form(&self.http, &self.endpoint, &form).await?;
        tracing::debug!("Tag provider {} answered {} bytes for {}", self.endpoint, raw.len(), cmd);
        check_result(&raw)?;
        Ok(raw)
    }
}

/// All-zero result code means success; anything else is a business error.
fn check_result(raw: &str) -> Result<(), ProviderError> {
    let code = first_tag(raw, "RESULT_CODE").ok_or_else(|| ProviderError::Unparseable {
        reason: "missing RESULT_CODE".to_string(),
        raw: raw.to_string(),
    })?;

    if !code.is_empty() && code.chars().all(|c| c == '0') {
        return Ok(());
    }

    Err(ProviderError::Rejected {
        message: first_tag(raw, "RESULT_DESC")
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Unknown provider error".to_string()),
        code,
        raw: raw.to_string(),
    })
}

fn required(raw: &str, tag: &str) -> Result<String, ProviderError> {
    first_tag(raw, tag)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Unparseable {
            reason: format!("missing {}", tag),
            raw: raw.to_string(),
        })
}

#[async_trait]
impl ProviderClient for TaggedClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tagged
    }

    fn issues_codes(&self) -> bool {
        true
    }

    async fn create_order(&self, spec: &ItemSpec) -> Result<CreatedOrder, ProviderError> {
        let params = [
            ("gameCode", spec.category_ref.clone().unwrap_or_default()),
            ("productCode", spec.product_ref.clone()),
            ("qty", spec.quantity.to_string()),
            ("character", spec.target.clone().unwrap_or_default()),
            ("note", spec.note.clone().unwrap_or_default()),
            ("preOrder", if spec.pre_order { "1" } else { "0" }.to_string()),
            ("tier", spec.tier.clone().unwrap_or_default()),
        ];

        let raw = self.call(CMD_ORDER, &params).await?;
        let external_ref = required(&raw, "ORDER_NO")?;

        Ok(CreatedOrder {
            external_ref,
            codes: extract_epin_blocks(&raw),
            raw,
        })
    }

    async fn check_status(&self, external_ref: &str) -> Result<StatusReport, ProviderError> {
        let raw = self.call(CMD_STATUS, &[("orderNo", external_ref.to_string())]).await?;
        let status = required(&raw, "STATUS_CODE")?;

        Ok(StatusReport {
            status: RawStatus::TagCode(status),
            codes: extract_epin_blocks(&raw),
            error_text: first_tag(&raw, "STATUS_DESC").filter(|d| !d.is_empty()),
            raw,
        })
    }

    async fn balance(&self) -> Result<BalanceReport, ProviderError> {
        let raw = self.call(CMD_BALANCE, &[]).await?;
        let balance = required(&raw, "BALANCE")?;
        let balance = parse_decimal(&balance).ok_or_else(|| ProviderError::Unparseable {
            reason: format!("BALANCE is not a number: {}", balance),
            raw: raw.clone(),
        })?;

        Ok(BalanceReport {
            balance,
            currency: first_tag(&raw, "CURRENCY").filter(|c| !c.is_empty()),
            raw,
        })
    }
}
