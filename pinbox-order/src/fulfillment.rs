use chrono::Utc;
use pinbox_core::delivery::extract;
use pinbox_core::notify::EventPublisher;
use pinbox_core::supplier::ProviderError;
use pinbox_core::CoreError;
use pinbox_shared::models::events::{MSG_ITEM_DELIVERED, MSG_ORDER_COMPLETED};
use pinbox_shared::{DomainEvent, FulfillmentCompletedEvent};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ApiProvider, DeliveryStatus, DeliveryUpdate, Order, OrderStatus};
use crate::registry::ProviderRegistry;
use crate::repository::OrderRepository;
use crate::status;

/// Result of handing one item to its provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched {
        item_id: Uuid,
        status: DeliveryStatus,
        external_ref: String,
    },
    /// Provider refused the order; the item is failed.
    Failed { item_id: Uuid, reason: String },
    /// Provider could not be reached; the item stays pending.
    Deferred { item_id: Uuid, reason: String },
    Skipped { item_id: Uuid, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Order item {0} was already dispatched")]
    AlreadyDispatched(Uuid),

    #[error("Product of order item {0} has no provider binding")]
    NotBound(Uuid),

    #[error("Order item {item_id} has invalid quantity {quantity}")]
    InvalidQuantity { item_id: Uuid, quantity: i32 },

    #[error("Provider {0} not found")]
    ProviderNotFound(Uuid),

    #[error("Provider {0} is inactive")]
    ProviderInactive(Uuid),

    #[error("Provider {id} is misconfigured: {reason}")]
    Misconfigured { id: Uuid, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] CoreError),
}

/// Creates provider orders for purchased items.
pub struct FulfillmentService {
    orders: Arc<dyn OrderRepository>,
    registry: Arc<ProviderRegistry>,
    events: Arc<dyn EventPublisher>,
}

impl FulfillmentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        registry: Arc<ProviderRegistry>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { orders, registry, events }
    }

    pub async fn dispatch_item(&self, item_id: Uuid) -> Result<DispatchOutcome, FulfillmentError> {
        let item = self
            .orders
            .get_item(item_id)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound(format!("order item {}", item_id)))?;

        if !item.is_undispatched() {
            return Err(FulfillmentError::AlreadyDispatched(item_id));
        }

        let product_id = item.product_id.ok_or(FulfillmentError::NotBound(item_id))?;
        let binding = self
            .orders
            .product_binding(product_id)
            .await?
            .ok_or(FulfillmentError::NotBound(item_id))?;

        let spec = binding.item_spec(&item).ok_or(FulfillmentError::InvalidQuantity {
            item_id,
            quantity: item.quantity,
        })?;
        let handle = self.registry.resolve(binding.api_provider_id).await?;

        match handle.client.create_order(&spec).await {
            Ok(created) => {
                let extracted = extract(&created.codes);
                let next = status::on_created(extracted.has_codes());
                let update = DeliveryUpdate {
                    status: next,
                    content: Some(extracted.content),
                    error: None,
                    api_provider_id: Some(handle.provider.id),
                    api_order_id: Some(created.external_ref.clone()),
                    response_log: response_log("create_order", &handle.provider, Some(&created.raw), None),
                };

                if !self.orders.record_delivery(item_id, DeliveryStatus::Pending, &update).await? {
                    return Ok(DispatchOutcome::Skipped {
                        item_id,
                        reason: "item changed while dispatching".to_string(),
                    });
                }
                info!(
                    "Item {} dispatched to {} as {} ({})",
                    item_id, handle.provider.name, created.external_ref, next
                );

                let order = refresh_order_status(self.orders.as_ref(), item.order_id).await?;
                if next == DeliveryStatus::Delivered {
                    announce_delivery(self.events.as_ref(), &order, item_id).await;
                }

                Ok(DispatchOutcome::Dispatched {
                    item_id,
                    status: next,
                    external_ref: created.external_ref,
                })
            }
            Err(e) if !e.is_terminal() => {
                warn!("Dispatch of item {} deferred: {}", item_id, e);
                let update = DeliveryUpdate {
                    status: DeliveryStatus::Pending,
                    content: None,
                    error: Some(e.support_message()),
                    api_provider_id: Some(handle.provider.id),
                    api_order_id: None,
                    response_log: response_log("create_order", &handle.provider, None, Some(&e)),
                };
                self.orders.record_delivery(item_id, DeliveryStatus::Pending, &update).await?;

                Ok(DispatchOutcome::Deferred { item_id, reason: e.support_message() })
            }
            Err(e) => {
                warn!("Dispatch of item {} failed: {}", item_id, e);
                let update = DeliveryUpdate {
                    status: DeliveryStatus::Failed,
                    content: None,
                    error: Some(e.support_message()),
                    api_provider_id: Some(handle.provider.id),
                    api_order_id: None,
                    response_log: response_log("create_order", &handle.provider, None, Some(&e)),
                };

                if !self.orders.record_delivery(item_id, DeliveryStatus::Pending, &update).await? {
                    return Ok(DispatchOutcome::Skipped {
                        item_id,
                        reason: "item changed while dispatching".to_string(),
                    });
                }
                refresh_order_status(self.orders.as_ref(), item.order_id).await?;

                Ok(DispatchOutcome::Failed { item_id, reason: e.support_message() })
            }
        }
    }

    /// Dispatch every item of the order that has not reached a provider yet.
    /// Per-item refusals are reported as skipped; storage errors abort.
    pub async fn dispatch_order(&self, order_id: Uuid) -> Result<Vec<DispatchOutcome>, FulfillmentError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::NotFound(format!("order {}", order_id)))?;

        let mut outcomes = Vec::new();
        for item in order.items.iter().filter(|i| i.is_undispatched()) {
            let outcome = match self.dispatch_item(item.id).await {
                Ok(outcome) => outcome,
                Err(FulfillmentError::Storage(e)) => return Err(FulfillmentError::Storage(e)),
                Err(e) => {
                    warn!("Item {} of order {} not dispatched: {}", item.id, order_id, e);
                    DispatchOutcome::Skipped { item_id: item.id, reason: e.to_string() }
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Snapshot stored in `api_response_log` after each provider call.
pub(crate) fn response_log(
    action: &str,
    provider: &ApiProvider,
    raw: Option<&str>,
    error: Option<&ProviderError>,
) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "provider_id": provider.id,
        "provider": provider.name,
        "checked_at": Utc::now().to_rfc3339(),
        "raw": raw,
        "error": error.map(ProviderError::detail),
    })
}

/// Recompute the order status from all of its items and persist it if it moved.
pub(crate) async fn refresh_order_status(orders: &dyn OrderRepository, order_id: Uuid) -> Result<Order, CoreError> {
    let mut order = orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;

    let computed = order.computed_status();
    if computed != order.status {
        orders.update_order_status(order_id, computed).await?;
        info!("Order {} {} -> {}", order_id, order.status, computed);
        order.status = computed;
    }

    Ok(order)
}

/// Emit the fulfillment-completed event for a freshly delivered item.
pub(crate) async fn announce_delivery(events: &dyn EventPublisher, order: &Order, item_id: Uuid) {
    let message_key = if order.status == OrderStatus::Completed {
        MSG_ORDER_COMPLETED
    } else {
        MSG_ITEM_DELIVERED
    };

    let event = DomainEvent::FulfillmentCompleted(FulfillmentCompletedEvent {
        order_id: order.id,
        order_item_id: item_id,
        customer_email: order.customer_email.clone(),
        message_key: message_key.to_string(),
        order_status: order.status.to_string(),
        timestamp: Utc::now().timestamp(),
    });

    if let Err(e) = events.publish(&event).await {
        warn!("Failed to publish delivery of item {}: {}", item_id, e);
    }
}
