//! Code extraction: turns provider code blocks into the human readable lines
//! and the newline-joined content stored on an order item.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scrape;

/// Content stored while a provider accepted the order but has not handed out
/// redeemable codes yet.
pub const AWAITING_DELIVERY: &str = "Order created, awaiting delivery";

/// One redeemable code and the description the provider paired with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredCode {
    pub code: String,
    pub desc: Option<String>,
}

impl DeliveredCode {
    pub fn new(code: impl Into<String>, desc: Option<String>) -> Self {
        Self {
            code: code.into(),
            desc: desc.filter(|d| !d.trim().is_empty()),
        }
    }
}

impl fmt::Display for DeliveredCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.desc {
            Some(desc) => write!(f, "{} ({})", self.code, desc),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Pull every `<epin>` block out of a raw payload. Within a block the first
/// `<code>` and the first `<desc>` belong together; blocks without a code are
/// dropped.
pub fn extract_epin_blocks(raw: &str) -> Vec<DeliveredCode> {
    scrape::blocks(raw, "epin")
        .into_iter()
        .filter_map(|block| {
            let code = scrape::first_tag(block, "code").filter(|c| !c.is_empty())?;
            Some(DeliveredCode::new(code, scrape::first_tag(block, "desc")))
        })
        .collect()
}

/// Result of running the extractor over a set of codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDelivery {
    pub lines: Vec<String>,
    pub content: String,
}

impl ExtractedDelivery {
    /// True when the content is real redeemable codes rather than the placeholder.
    pub fn has_codes(&self) -> bool {
        !self.lines.is_empty()
    }
}

pub fn extract(codes: &[DeliveredCode]) -> ExtractedDelivery {
    let lines: Vec<String> = codes.iter().map(ToString::to_string).collect();
    let content = if lines.is_empty() {
        AWAITING_DELIVERY.to_string()
    } else {
        lines.join("\n")
    };

    ExtractedDelivery { lines, content }
}
