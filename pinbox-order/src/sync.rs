//! Delivery sweeps: poll providers for items that were dispatched but are not
//! finished yet, and move them forward.

use chrono::{DateTime, Utc};
use pinbox_core::delivery::{extract, AWAITING_DELIVERY};
use pinbox_core::notify::EventPublisher;
use pinbox_core::supplier::StatusReport;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::fulfillment::{announce_delivery, refresh_order_status, response_log, FulfillmentError};
use crate::models::{DeliveryStatus, DeliveryUpdate, OrderItem, SweepScope};
use crate::registry::{ProviderHandle, ProviderRegistry};
use crate::repository::OrderRepository;
use crate::status::{self, Mapping};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    Updated { from: DeliveryStatus, to: DeliveryStatus },
    Unchanged,
    /// Provider or storage trouble; the item was left as it was.
    Failed { reason: String },
    /// Lost a concurrent write or had nothing to check.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemOutcome {
    pub item_id: Uuid,
    pub order_id: Uuid,
    #[serde(flatten)]
    pub result: ItemResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub scope: SweepScope,
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<ItemOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SweepReport {
    fn new(scope: SweepScope) -> Self {
        let now = Utc::now();
        Self {
            scope,
            checked: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            skipped: 0,
            outcomes: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn record(&mut self, item: &OrderItem, result: ItemResult) {
        self.checked += 1;
        match result {
            ItemResult::Updated { .. } => self.updated += 1,
            ItemResult::Unchanged => self.unchanged += 1,
            ItemResult::Failed { .. } => self.failed += 1,
            ItemResult::Skipped { .. } => self.skipped += 1,
        }
        self.outcomes.push(ItemOutcome {
            item_id: item.id,
            order_id: item.order_id,
            result,
        });
    }
}

pub struct DeliverySynchronizer {
    orders: Arc<dyn OrderRepository>,
    registry: Arc<ProviderRegistry>,
    events: Arc<dyn EventPublisher>,
}

impl DeliverySynchronizer {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        registry: Arc<ProviderRegistry>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { orders, registry, events }
    }

    /// Check every awaiting item in `scope`, one at a time. A failing item
    /// never stops the sweep.
    pub async fn sweep(&self, scope: SweepScope) -> Result<SweepReport, FulfillmentError> {
        let items = self.orders.awaiting_delivery(scope).await?;
        let mut report = SweepReport::new(scope);
        let mut handles: HashMap<Uuid, Result<ProviderHandle, String>> = HashMap::new();

        info!("Delivery sweep {:?}: {} item(s) awaiting delivery", scope, items.len());

        for item in &items {
            let result = self.check(item, &mut handles).await;
            report.record(item, result);
        }

        report.finished_at = Utc::now();
        info!(
            "Delivery sweep {:?} done: {} checked, {} updated, {} unchanged, {} failed, {} skipped",
            scope, report.checked, report.updated, report.unchanged, report.failed, report.skipped
        );
        Ok(report)
    }

    /// Re-check a single item.
    pub async fn check_item(&self, item_id: Uuid) -> Result<SweepReport, FulfillmentError> {
        if self.orders.get_item(item_id).await?.is_none() {
            return Err(FulfillmentError::NotFound(format!("order item {}", item_id)));
        }
        self.sweep(SweepScope::Item(item_id)).await
    }

    pub async fn check_order(&self, order_id: Uuid) -> Result<SweepReport, FulfillmentError> {
        if self.orders.get_order(order_id).await?.is_none() {
            return Err(FulfillmentError::NotFound(format!("order {}", order_id)));
        }
        self.sweep(SweepScope::Order(order_id)).await
    }

    async fn check(
        &self,
        item: &OrderItem,
        handles: &mut HashMap<Uuid, Result<ProviderHandle, String>>,
    ) -> ItemResult {
        let Some(external_ref) = item.api_order_id.as_deref() else {
            return ItemResult::Skipped { reason: "no provider reference".to_string() };
        };

        let provider_id = match self.provider_of(item).await {
            Ok(Some(id)) => id,
            Ok(None) => return ItemResult::Skipped { reason: "no provider recorded".to_string() },
            Err(e) => return self.storage_failure(item, e),
        };

        if !handles.contains_key(&provider_id) {
            let resolved = self.registry.resolve(provider_id).await.map_err(|e| e.to_string());
            handles.insert(provider_id, resolved);
        }
        let handle = match handles.get(&provider_id) {
            Some(Ok(handle)) => handle.clone(),
            Some(Err(reason)) => {
                warn!("Item {}: provider {} unavailable: {}", item.id, provider_id, reason);
                return ItemResult::Failed { reason: reason.clone() };
            }
            None => return ItemResult::Skipped { reason: "provider not resolved".to_string() },
        };

        let update = match handle.client.check_status(external_ref).await {
            Ok(report) => self.interpret(item, &handle, report),
            Err(e) if e.is_terminal() => {
                warn!("Item {}: status check refused: {}", item.id, e);
                DeliveryUpdate {
                    status: DeliveryStatus::Failed,
                    content: codes_only(item.delivery_content.clone()),
                    error: Some(e.support_message()),
                    api_provider_id: Some(provider_id),
                    api_order_id: None,
                    response_log: response_log("check_status", &handle.provider, None, Some(&e)),
                }
            }
            Err(e) => {
                warn!("Item {}: provider unreachable: {}", item.id, e);
                return ItemResult::Failed { reason: e.to_string() };
            }
        };

        self.persist(item, update).await
    }

    /// Map a status report onto the item. An unknown provider status keeps
    /// everything but the response log.
    fn interpret(&self, item: &OrderItem, handle: &ProviderHandle, report: StatusReport) -> DeliveryUpdate {
        let log = response_log("check_status", &handle.provider, Some(&report.raw), None);
        let unchanged = DeliveryUpdate {
            status: item.delivery_status,
            content: item.delivery_content.clone(),
            error: item.delivery_error.clone(),
            api_provider_id: Some(handle.provider.id),
            api_order_id: None,
            response_log: log,
        };

        let Some(mapping) = status::map_status(&report.status) else {
            warn!("Item {}: unknown provider status {:?}", item.id, report.status);
            return unchanged;
        };

        let issues_codes = handle.client.issues_codes();
        let extracted = extract(&report.codes);
        let next = item
            .delivery_status
            .advance(status::settle(mapping.status, issues_codes, extracted.has_codes()));

        DeliveryUpdate {
            status: next,
            content: delivery_content(item, next, &mapping, issues_codes, extracted.has_codes().then_some(extracted.content)),
            error: match next {
                DeliveryStatus::Failed => Some(
                    report
                        .error_text
                        .unwrap_or_else(|| format!("Provider reported order {}", mapping.label.to_lowercase())),
                ),
                _ => None,
            },
            ..unchanged
        }
    }

    async fn persist(&self, item: &OrderItem, update: DeliveryUpdate) -> ItemResult {
        let from = item.delivery_status;
        let to = update.status;

        match self.orders.record_delivery(item.id, from, &update).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Item {} changed during the sweep, skipping", item.id);
                return ItemResult::Skipped { reason: "item changed concurrently".to_string() };
            }
            Err(e) => return self.storage_failure(item, e.into()),
        }

        if from == to {
            return ItemResult::Unchanged;
        }
        info!("Item {} {} -> {}", item.id, from, to);

        match refresh_order_status(self.orders.as_ref(), item.order_id).await {
            Ok(order) => {
                if to == DeliveryStatus::Delivered {
                    announce_delivery(self.events.as_ref(), &order, item.id).await;
                }
            }
            Err(e) => error!("Failed to refresh order {}: {}", item.order_id, e),
        }

        ItemResult::Updated { from, to }
    }

    async fn provider_of(&self, item: &OrderItem) -> Result<Option<Uuid>, FulfillmentError> {
        if let Some(id) = item.api_provider_id {
            return Ok(Some(id));
        }
        let Some(product_id) = item.product_id else {
            return Ok(None);
        };
        Ok(self.orders.product_binding(product_id).await?.map(|b| b.api_provider_id))
    }

    fn storage_failure(&self, item: &OrderItem, e: FulfillmentError) -> ItemResult {
        error!("Item {}: {}", item.id, e);
        ItemResult::Failed { reason: e.to_string() }
    }
}

fn delivery_content(
    item: &OrderItem,
    next: DeliveryStatus,
    mapping: &Mapping,
    issues_codes: bool,
    codes: Option<String>,
) -> Option<String> {
    if let Some(codes) = codes {
        return Some(codes);
    }
    if !issues_codes && next == DeliveryStatus::Delivered {
        return Some(mapping.label.to_string());
    }
    if next == DeliveryStatus::Failed {
        return codes_only(item.delivery_content.clone());
    }
    item.delivery_content
        .clone()
        .or_else(|| (next == DeliveryStatus::Processing).then(|| AWAITING_DELIVERY.to_string()))
}

/// Drops the awaiting-delivery placeholder, keeping any real codes.
fn codes_only(content: Option<String>) -> Option<String> {
    content.filter(|c| c != AWAITING_DELIVERY)
}
