use rust_decimal::Decimal;
use uuid::Uuid;

/// Message keys understood by the notification collaborator.
pub const MSG_ITEM_DELIVERED: &str = "order.item_delivered";
pub const MSG_ORDER_COMPLETED: &str = "order.completed";
pub const MSG_DEPOSIT_APPROVED: &str = "wallet.deposit_approved";
pub const MSG_DEPOSIT_REJECTED: &str = "wallet.deposit_rejected";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct FulfillmentCompletedEvent {
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub customer_email: Option<String>,
    pub message_key: String,
    pub order_status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct DepositApprovedEvent {
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub new_balance: Decimal,
    pub message_key: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct DepositRejectedEvent {
    pub deposit_id: Uuid,
    pub user_id: Uuid,
    pub admin_note: Option<String>,
    pub message_key: String,
    pub timestamp: i64,
}

/// Everything the engine hands to the notification side.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    FulfillmentCompleted(FulfillmentCompletedEvent),
    DepositApproved(DepositApprovedEvent),
    DepositRejected(DepositRejectedEvent),
}

impl DomainEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::FulfillmentCompleted(_) => "fulfillment.completed",
            DomainEvent::DepositApproved(_) => "wallet.deposit_approved",
            DomainEvent::DepositRejected(_) => "wallet.deposit_rejected",
        }
    }

    /// Partition key: the order for fulfillment events, the user for wallet events.
    pub fn key(&self) -> String {
        match self {
            DomainEvent::FulfillmentCompleted(e) => e.order_id.to_string(),
            DomainEvent::DepositApproved(e) => e.user_id.to_string(),
            DomainEvent::DepositRejected(e) => e.user_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_on_the_wire() {
        let event = DomainEvent::DepositRejected(DepositRejectedEvent {
            deposit_id: Uuid::nil(),
            user_id: Uuid::nil(),
            admin_note: Some("proof unreadable".to_string()),
            message_key: MSG_DEPOSIT_REJECTED.to_string(),
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deposit_rejected");
        assert_eq!(json["admin_note"], "proof unreadable");
        assert_eq!(event.topic(), "wallet.deposit_rejected");
    }
}
