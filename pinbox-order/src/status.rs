//! Maps provider status vocabularies onto [`DeliveryStatus`].

use pinbox_core::supplier::RawStatus;

use crate::models::{DeliveryStatus, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub status: DeliveryStatus,
    pub order_hint: OrderStatus,
    /// Human readable provider state, stored as content when nothing better exists.
    pub label: &'static str,
}

const fn mapping(status: DeliveryStatus, order_hint: OrderStatus, label: &'static str) -> Mapping {
    Mapping { status, order_hint, label }
}

const CANCELLED: Mapping = mapping(DeliveryStatus::Failed, OrderStatus::Cancelled, "Cancelled");
const ERRORED: Mapping = mapping(DeliveryStatus::Failed, OrderStatus::Cancelled, "Error");
const COMPLETED: Mapping = mapping(DeliveryStatus::Delivered, OrderStatus::Completed, "Completed");
const PARTIAL: Mapping = mapping(DeliveryStatus::Processing, OrderStatus::Processing, "Partially completed");
const IN_PROGRESS: Mapping = mapping(DeliveryStatus::Processing, OrderStatus::Processing, "In progress");
const QUEUED: Mapping = mapping(DeliveryStatus::Processing, OrderStatus::Processing, "Queued");
const AWAITING_STOCK: Mapping = mapping(DeliveryStatus::Processing, OrderStatus::Processing, "Awaiting stock");

/// `None` means "no information yet": the caller keeps the current status.
pub fn map_status(raw: &RawStatus) -> Option<Mapping> {
    match raw {
        RawStatus::TagCode(code) => map_tag_code(code),
        RawStatus::Panel(status) => map_panel_status(status),
    }
}

fn map_tag_code(code: &str) -> Option<Mapping> {
    match code.trim().parse::<u32>().ok()? {
        1 => Some(QUEUED),
        2 => Some(IN_PROGRESS),
        3 => Some(COMPLETED),
        4 => Some(CANCELLED),
        5 => Some(ERRORED),
        6 => Some(AWAITING_STOCK),
        7 => Some(PARTIAL),
        _ => None,
    }
}

fn map_panel_status(status: &str) -> Option<Mapping> {
    let normalized = status
        .trim()
        .to_ascii_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    match normalized.as_str() {
        "completed" => Some(COMPLETED),
        "partial" => Some(PARTIAL),
        "in progress" | "processing" => Some(IN_PROGRESS),
        "pending" => Some(QUEUED),
        "canceled" | "cancelled" => Some(CANCELLED),
        "error" | "fail" | "failed" => Some(ERRORED),
        _ => None,
    }
}

/// Status right after a provider accepted an order: delivered only when it
/// already handed out codes.
pub fn on_created(has_codes: bool) -> DeliveryStatus {
    if has_codes {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Processing
    }
}

/// A code-issuing provider that reports completion without codes is not
/// delivered yet.
pub fn settle(mapped: DeliveryStatus, issues_codes: bool, has_codes: bool) -> DeliveryStatus {
    if mapped == DeliveryStatus::Delivered && issues_codes && !has_codes {
        DeliveryStatus::Processing
    } else {
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(s: &str) -> Option<DeliveryStatus> {
        map_status(&RawStatus::Panel(s.to_string())).map(|m| m.status)
    }

    fn tag(s: &str) -> Option<DeliveryStatus> {
        map_status(&RawStatus::TagCode(s.to_string())).map(|m| m.status)
    }

    #[test]
    fn test_panel_vocabulary() {
        assert_eq!(panel("Completed"), Some(DeliveryStatus::Delivered));
        assert_eq!(panel("Partial"), Some(DeliveryStatus::Processing));
        assert_eq!(panel("In progress"), Some(DeliveryStatus::Processing));
        assert_eq!(panel("in_progress"), Some(DeliveryStatus::Processing));
        assert_eq!(panel("Pending"), Some(DeliveryStatus::Processing));
        assert_eq!(panel("Canceled"), Some(DeliveryStatus::Failed));
        assert_eq!(panel("Cancelled"), Some(DeliveryStatus::Failed));
        assert_eq!(panel("Error"), Some(DeliveryStatus::Failed));
        assert_eq!(panel("Refill requested"), None);
    }

    #[test]
    fn test_tag_codes() {
        assert_eq!(tag("1"), Some(DeliveryStatus::Processing));
        assert_eq!(tag("03"), Some(DeliveryStatus::Delivered));
        assert_eq!(tag("4"), Some(DeliveryStatus::Failed));
        assert_eq!(tag("5"), Some(DeliveryStatus::Failed));
        assert_eq!(tag("6"), Some(DeliveryStatus::Processing));
        assert_eq!(tag("42"), None);
        assert_eq!(tag("n/a"), None);
    }

    #[test]
    fn test_order_hints() {
        let hint = |raw: RawStatus| map_status(&raw).map(|m| m.order_hint);
        assert_eq!(hint(RawStatus::Panel("Canceled".into())), Some(OrderStatus::Cancelled));
        assert_eq!(hint(RawStatus::TagCode("3".into())), Some(OrderStatus::Completed));
        assert_eq!(hint(RawStatus::Panel("Partial".into())), Some(OrderStatus::Processing));
    }

    #[test]
    fn test_delivered_requires_codes_for_code_issuers() {
        assert_eq!(settle(DeliveryStatus::Delivered, true, false), DeliveryStatus::Processing);
        assert_eq!(settle(DeliveryStatus::Delivered, true, true), DeliveryStatus::Delivered);
        assert_eq!(settle(DeliveryStatus::Delivered, false, false), DeliveryStatus::Delivered);
        assert_eq!(on_created(false), DeliveryStatus::Processing);
    }
}
