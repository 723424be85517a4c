use chrono::{DateTime, Utc};
use pinbox_core::supplier::{ItemSpec, ProviderKind};
use pinbox_core::CoreError;
use pinbox_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fulfillment state of a single order item.
///
/// Moves forward only: `Pending → Processing → Delivered`, or to `Failed`
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    pub fn can_advance_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            (from, to) if from == to => false,
            (_, Failed) => true,
            (Pending, Processing) | (Pending, Delivered) | (Processing, Delivered) => true,
            _ => false,
        }
    }

    /// The status after applying `next`; regressions are ignored.
    pub fn advance(self, next: DeliveryStatus) -> DeliveryStatus {
        if self.can_advance_to(next) {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "processing" => Ok(DeliveryStatus::Processing),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(CoreError::ValidationError(format!("unknown delivery status: {}", other))),
        }
    }
}

/// Aggregate status of an order, derived from its items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!("unknown order status: {}", other))),
        }
    }
}

/// Reduce sibling item states to the order status: any failure cancels the
/// order, all delivered completes it, all pending (or no items) keeps it
/// pending, anything else is processing.
pub fn aggregate_status<I>(items: I) -> OrderStatus
where
    I: IntoIterator<Item = DeliveryStatus>,
{
    let mut any = false;
    let mut all_delivered = true;
    let mut all_pending = true;

    for status in items {
        any = true;
        if status == DeliveryStatus::Failed {
            return OrderStatus::Cancelled;
        }
        all_delivered &= status == DeliveryStatus::Delivered;
        all_pending &= status == DeliveryStatus::Pending;
    }

    match (any, all_delivered, all_pending) {
        (false, _, _) => OrderStatus::Pending,
        (true, true, _) => OrderStatus::Completed,
        (true, _, true) => OrderStatus::Pending,
        _ => OrderStatus::Processing,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: Option<Uuid>, customer_email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            customer_email,
            status: OrderStatus::Pending,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_item(&mut self, mut item: OrderItem) {
        item.order_id = self.id;
        self.items.push(item);
        self.updated_at = Utc::now();
    }

    pub fn computed_status(&self) -> OrderStatus {
        aggregate_status(self.items.iter().map(|i| i.delivery_status))
    }
}

/// A purchased product line and its fulfillment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub target_account: Option<String>,
    pub customer_note: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub delivery_content: Option<String>,
    pub delivery_error: Option<String>,
    pub api_provider_id: Option<Uuid>,
    pub api_order_id: Option<String>,
    pub api_response_log: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Option<Uuid>, product_name: String, quantity: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            product_name,
            quantity,
            target_account: None,
            customer_note: None,
            delivery_status: DeliveryStatus::Pending,
            delivery_content: None,
            delivery_error: None,
            api_provider_id: None,
            api_order_id: None,
            api_response_log: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target_account = Some(target.to_string());
        self
    }

    /// Still waiting for a provider order to be created.
    pub fn is_undispatched(&self) -> bool {
        self.delivery_status == DeliveryStatus::Pending && self.api_order_id.is_none()
    }

    pub fn apply(&mut self, update: &DeliveryUpdate) {
        self.delivery_status = update.status;
        self.delivery_content = update.content.clone();
        self.delivery_error = update.error.clone();
        if update.api_provider_id.is_some() {
            self.api_provider_id = update.api_provider_id;
        }
        if update.api_order_id.is_some() {
            self.api_order_id = update.api_order_id.clone();
        }
        self.api_response_log = update.response_log.clone();
        self.updated_at = Utc::now();
    }
}

/// New delivery state for one item. Content, error and log replace the stored
/// values; provider id and reference are only written when present.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub content: Option<String>,
    pub error: Option<String>,
    pub api_provider_id: Option<Uuid>,
    pub api_order_id: Option<String>,
    pub response_log: serde_json::Value,
}

/// A product's link to the provider that fulfills it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductBinding {
    pub product_id: Uuid,
    pub api_provider_id: Uuid,
    pub api_product_ref: String,
    pub api_category_ref: Option<String>,
    pub pre_order: bool,
    pub tier: Option<String>,
}

impl ProductBinding {
    /// Provider request for `item`; `None` when the quantity is not positive.
    pub fn item_spec(&self, item: &OrderItem) -> Option<ItemSpec> {
        let quantity = u32::try_from(item.quantity).ok().filter(|q| *q > 0)?;
        Some(ItemSpec {
            product_ref: self.api_product_ref.clone(),
            category_ref: self.api_category_ref.clone(),
            quantity,
            target: item.target_account.clone(),
            note: item.customer_note.clone(),
            pre_order: self.pre_order,
            tier: self.tier.clone(),
        })
    }
}

/// An external fulfillment integration as configured by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProvider {
    pub id: Uuid,
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Masked<String>,
    pub is_active: bool,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
    pub balance_checked_at: Option<DateTime<Utc>>,
}

/// Which items a sweep looks at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SweepScope {
    All,
    Order(Uuid),
    Item(Uuid),
}
