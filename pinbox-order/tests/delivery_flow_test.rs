use async_trait::async_trait;
use pinbox_core::credentials::ProviderCredentials;
use pinbox_core::delivery::{DeliveredCode, AWAITING_DELIVERY};
use pinbox_core::supplier::{
    BalanceReport, ClientFactory, CreatedOrder, ItemSpec, ProviderClient, ProviderError, ProviderKind, RawStatus,
    StatusReport,
};
use pinbox_core::CoreResult;
use pinbox_order::fulfillment::{DispatchOutcome, FulfillmentError, FulfillmentService};
use pinbox_order::models::{ApiProvider, DeliveryStatus, Order, OrderItem, OrderStatus, ProductBinding};
use pinbox_order::repository::{OrderRepository, ProviderRepository};
use pinbox_order::{DeliverySynchronizer, InMemoryStore, ItemResult, ProviderRegistry, RecordingPublisher, SweepScope};
use pinbox_shared::DomainEvent;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Scripted provider: create replies are consumed in order, status replies are
/// looked up by external reference.
struct FakeClient {
    kind: ProviderKind,
    creates: Mutex<VecDeque<Result<CreatedOrder, ProviderError>>>,
    statuses: Mutex<HashMap<String, Result<StatusReport, ProviderError>>>,
    status_calls: Mutex<Vec<String>>,
}

impl FakeClient {
    fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            creates: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            status_calls: Mutex::new(Vec::new()),
        })
    }

    fn on_create(&self, reply: Result<CreatedOrder, ProviderError>) {
        self.creates.lock().unwrap().push_back(reply);
    }

    fn on_status(&self, external_ref: &str, reply: Result<StatusReport, ProviderError>) {
        self.statuses.lock().unwrap().insert(external_ref.to_string(), reply);
    }
}

#[async_trait]
impl ProviderClient for FakeClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn issues_codes(&self) -> bool {
        self.kind == ProviderKind::Tagged
    }

    async fn create_order(&self, _spec: &ItemSpec) -> Result<CreatedOrder, ProviderError> {
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Unreachable("no scripted reply".into())))
    }

    async fn check_status(&self, external_ref: &str) -> Result<StatusReport, ProviderError> {
        self.status_calls.lock().unwrap().push(external_ref.to_string());
        self.statuses
            .lock()
            .unwrap()
            .get(external_ref)
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Unreachable("no scripted reply".into())))
    }

    async fn balance(&self) -> Result<BalanceReport, ProviderError> {
        Ok(BalanceReport { balance: dec!(1520.75), currency: Some("TRY".into()), raw: "<BALANCE>1520.75</BALANCE>".into() })
    }
}

struct FakeFactory {
    client: Arc<FakeClient>,
    builds: Mutex<usize>,
}

impl ClientFactory for FakeFactory {
    fn build(
        &self,
        _kind: ProviderKind,
        _base_url: &str,
        _credentials: ProviderCredentials,
    ) -> CoreResult<Arc<dyn ProviderClient>> {
        *self.builds.lock().unwrap() += 1;
        Ok(self.client.clone())
    }
}

struct Fixture {
    store: InMemoryStore,
    events: RecordingPublisher,
    client: Arc<FakeClient>,
    factory: Arc<FakeFactory>,
    provider: ApiProvider,
    product_id: Uuid,
    dispatcher: FulfillmentService,
    sync: DeliverySynchronizer,
}

async fn fixture(kind: ProviderKind) -> Fixture {
    let store = InMemoryStore::new();
    let events = RecordingPublisher::new();
    let client = FakeClient::new(kind);
    let factory = Arc::new(FakeFactory { client: client.clone(), builds: Mutex::new(0) });

    let provider = ApiProvider {
        id: Uuid::new_v4(),
        name: format!("{} provider", kind),
        kind,
        base_url: "http://provider.test".into(),
        api_key: match kind {
            ProviderKind::Tagged => "dealer01:secret".into(),
            ProviderKind::Panel => "panel-key".into(),
        },
        is_active: true,
        balance: None,
        currency: None,
        balance_checked_at: None,
    };
    store.insert_provider(provider.clone()).await;

    let product_id = Uuid::new_v4();
    store
        .insert_binding(ProductBinding {
            product_id,
            api_provider_id: provider.id,
            api_product_ref: "PUBG-660".into(),
            api_category_ref: Some("PUBG".into()),
            pre_order: false,
            tier: None,
        })
        .await;

    let registry = Arc::new(ProviderRegistry::new(Arc::new(store.clone()), factory.clone()));
    let dispatcher = FulfillmentService::new(Arc::new(store.clone()), registry.clone(), Arc::new(events.clone()));
    let sync = DeliverySynchronizer::new(Arc::new(store.clone()), registry, Arc::new(events.clone()));

    Fixture { store, events, client, factory, provider, product_id, dispatcher, sync }
}

impl Fixture {
    /// Order with `n` undispatched items bound to the fixture provider.
    async fn order(&self, n: usize) -> Order {
        let mut order = Order::new(None, Some("buyer@example.com".into()));
        for i in 0..n {
            let item = OrderItem::new(order.id, Some(self.product_id), format!("PUBG 660 UC #{}", i + 1), 1)
                .with_target("5123456789");
            order.add_item(item);
        }
        self.store.insert_order(order.clone()).await;
        order
    }

    /// Order whose items were already handed to the provider as `ref-1`, `ref-2`, ...
    async fn dispatched_order(&self, n: usize) -> Order {
        let mut order = Order::new(None, Some("buyer@example.com".into()));
        order.status = OrderStatus::Processing;
        for i in 0..n {
            let mut item = OrderItem::new(order.id, Some(self.product_id), format!("Item {}", i + 1), 1);
            item.delivery_status = DeliveryStatus::Processing;
            item.delivery_content = Some(AWAITING_DELIVERY.into());
            item.api_provider_id = Some(self.provider.id);
            item.api_order_id = Some(format!("ref-{}", i + 1));
            order.add_item(item);
        }
        self.store.insert_order(order.clone()).await;
        order
    }

    async fn item(&self, id: Uuid) -> OrderItem {
        self.store.get_item(id).await.unwrap().unwrap()
    }

    async fn order_status(&self, id: Uuid) -> OrderStatus {
        self.store.get_order(id).await.unwrap().unwrap().status
    }
}

fn tag_status(code: &str, codes: Vec<DeliveredCode>) -> Result<StatusReport, ProviderError> {
    Ok(StatusReport {
        status: RawStatus::TagCode(code.into()),
        codes,
        error_text: None,
        raw: format!("<STATUS_CODE>{}</STATUS_CODE>", code),
    })
}

fn panel_status(status: &str) -> Result<StatusReport, ProviderError> {
    Ok(StatusReport {
        status: RawStatus::Panel(status.into()),
        codes: Vec::new(),
        error_text: None,
        raw: format!(r#"{{"status":"{}"}}"#, status),
    })
}

#[tokio::test]
async fn test_dispatch_with_codes_delivers_immediately() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.order(1).await;
    fx.client.on_create(Ok(CreatedOrder {
        external_ref: "EP-1001".into(),
        codes: vec![DeliveredCode::new("A1", Some("Desc1".into())), DeliveredCode::new("A2", None)],
        raw: "<RESULT_CODE>000</RESULT_CODE>".into(),
    }));

    let outcome = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Dispatched { status: DeliveryStatus::Delivered, .. }));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(item.delivery_content.as_deref(), Some("A1 (Desc1)\nA2"));
    assert_eq!(item.api_order_id.as_deref(), Some("EP-1001"));
    assert_eq!(item.api_provider_id, Some(fx.provider.id));
    assert_eq!(item.api_response_log["action"], "create_order");
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Completed);

    let events = fx.events.events().await;
    match events.as_slice() {
        [DomainEvent::FulfillmentCompleted(e)] => {
            assert_eq!(e.order_id, order.id);
            assert_eq!(e.message_key, "order.completed");
            assert_eq!(e.customer_email.as_deref(), Some("buyer@example.com"));
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_dispatch_without_codes_waits_for_delivery() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.order(1).await;
    fx.client.on_create(Ok(CreatedOrder { external_ref: "EP-1002".into(), codes: Vec::new(), raw: String::new() }));

    fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap();

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Processing);
    assert_eq!(item.delivery_content.as_deref(), Some(AWAITING_DELIVERY));
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Processing);
    assert!(fx.events.events().await.is_empty());
}

#[tokio::test]
async fn test_rejected_dispatch_fails_item_and_cancels_order() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.order(2).await;
    fx.client.on_create(Err(ProviderError::Rejected {
        code: "105".into(),
        message: "Insufficient dealer balance".into(),
        raw: "<RESULT_CODE>105</RESULT_CODE>".into(),
    }));

    let outcome = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Failed);
    assert!(item.delivery_error.unwrap().contains("Insufficient dealer balance"));
    assert_eq!(item.api_response_log["error"]["kind"], "rejected");
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_unreachable_dispatch_stays_pending() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.order(1).await;
    fx.client.on_create(Err(ProviderError::Unreachable("connection refused".into())));

    let outcome = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Deferred { .. }));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Pending);
    assert!(item.api_order_id.is_none());
    assert!(item.delivery_error.is_some());
    assert!(item.is_undispatched());
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn test_dispatch_refuses_dispatched_and_unbound_items() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(1).await;
    let err = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::AlreadyDispatched(_)));

    let mut loose = Order::new(None, None);
    loose.add_item(OrderItem::new(loose.id, Some(Uuid::new_v4()), "Unlisted".into(), 1));
    fx.store.insert_order(loose.clone()).await;
    let err = fx.dispatcher.dispatch_item(loose.items[0].id).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::NotBound(_)));
}

#[tokio::test]
async fn test_dispatch_refuses_non_positive_quantity() {
    let fx = fixture(ProviderKind::Tagged).await;
    let mut order = Order::new(None, None);
    order.add_item(OrderItem::new(order.id, Some(fx.product_id), "PUBG 660 UC".into(), 0));
    fx.store.insert_order(order.clone()).await;

    let err = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidQuantity { quantity: 0, .. }));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Pending);
    assert!(item.api_order_id.is_none());
    assert!(fx.client.creates.lock().unwrap().is_empty());
    assert_eq!(*fx.factory.builds.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_inactive_provider_is_refused() {
    let fx = fixture(ProviderKind::Panel).await;
    let mut provider = fx.provider.clone();
    provider.is_active = false;
    fx.store.insert_provider(provider).await;
    let order = fx.order(1).await;

    let err = fx.dispatcher.dispatch_item(order.items[0].id).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::ProviderInactive(_)));
    assert_eq!(fx.item(order.items[0].id).await.delivery_status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn test_dispatch_order_reports_each_item() {
    let fx = fixture(ProviderKind::Panel).await;
    let order = fx.order(2).await;
    fx.client.on_create(Ok(CreatedOrder { external_ref: "9001".into(), codes: Vec::new(), raw: "{}".into() }));
    fx.client.on_create(Err(ProviderError::Rejected { code: "error".into(), message: "Incorrect link".into(), raw: "{}".into() }));

    let outcomes = fx.dispatcher.dispatch_order(order.id).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], DispatchOutcome::Dispatched { status: DeliveryStatus::Processing, .. }));
    assert!(matches!(outcomes[1], DispatchOutcome::Failed { .. }));
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_sweep_isolates_provider_errors() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(3).await;
    fx.client.on_status("ref-1", tag_status("3", vec![DeliveredCode::new("CODE-1", None)]));
    fx.client.on_status("ref-2", Err(ProviderError::Unreachable("timed out".into())));
    fx.client.on_status("ref-3", tag_status("3", vec![DeliveredCode::new("CODE-3", None)]));

    let report = fx.sync.sweep(SweepScope::All).await.unwrap();

    assert_eq!(report.checked, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, 1);
    assert!(matches!(report.outcomes[1].result, ItemResult::Failed { .. }));
    assert_eq!(*fx.client.status_calls.lock().unwrap(), vec!["ref-1", "ref-2", "ref-3"]);

    let first = fx.item(order.items[0].id).await;
    let second = fx.item(order.items[1].id).await;
    let third = fx.item(order.items[2].id).await;
    assert_eq!(first.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(first.delivery_content.as_deref(), Some("CODE-1"));
    assert!(first.api_response_log["checked_at"].is_string());
    assert_eq!(second.delivery_status, DeliveryStatus::Processing);
    assert_eq!(second.delivery_content.as_deref(), Some(AWAITING_DELIVERY));
    assert_eq!(third.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Processing);

    // One adapter per provider per sweep.
    assert_eq!(*fx.factory.builds.lock().unwrap(), 1);

    let keys: Vec<String> = fx
        .events
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            DomainEvent::FulfillmentCompleted(e) => Some(e.message_key),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec!["order.item_delivered", "order.item_delivered"]);
}

#[tokio::test]
async fn test_panel_cancel_fails_processing_item() {
    let fx = fixture(ProviderKind::Panel).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status("ref-1", panel_status("Canceled"));

    let report = fx.sync.check_order(order.id).await.unwrap();
    assert!(matches!(
        report.outcomes[0].result,
        ItemResult::Updated { from: DeliveryStatus::Processing, to: DeliveryStatus::Failed }
    ));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Failed);
    assert!(item.delivery_error.is_some());
    assert_eq!(item.delivery_content, None);
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_panel_completion_records_status_line() {
    let fx = fixture(ProviderKind::Panel).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status("ref-1", panel_status("Completed"));

    fx.sync.check_item(order.items[0].id).await.unwrap();

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(item.delivery_content.as_deref(), Some("Completed"));
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Completed);
}

#[tokio::test]
async fn test_tag_completion_without_codes_keeps_processing() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status("ref-1", tag_status("3", Vec::new()));

    let report = fx.sync.sweep(SweepScope::Item(order.items[0].id)).await.unwrap();
    assert!(matches!(report.outcomes[0].result, ItemResult::Unchanged));
    assert_eq!(fx.item(order.items[0].id).await.delivery_status, DeliveryStatus::Processing);
}

#[tokio::test]
async fn test_unknown_status_only_refreshes_log() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status("ref-1", tag_status("99", Vec::new()));

    let report = fx.sync.sweep(SweepScope::All).await.unwrap();
    assert_eq!(report.unchanged, 1);

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Processing);
    assert_eq!(item.api_response_log["action"], "check_status");
}

#[tokio::test]
async fn test_rejected_status_check_fails_item() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status(
        "ref-1",
        Err(ProviderError::Rejected { code: "204".into(), message: "Order not found".into(), raw: String::new() }),
    );

    fx.sync.sweep(SweepScope::All).await.unwrap();

    assert_eq!(fx.item(order.items[0].id).await.delivery_status, DeliveryStatus::Failed);
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_unreadable_status_reply_fails_item() {
    let fx = fixture(ProviderKind::Tagged).await;
    let order = fx.dispatched_order(1).await;
    fx.client.on_status(
        "ref-1",
        Err(ProviderError::Unparseable { reason: "missing STATUS_CODE".into(), raw: "<html>".into() }),
    );

    let report = fx.sync.sweep(SweepScope::All).await.unwrap();
    assert!(matches!(
        report.outcomes[0].result,
        ItemResult::Updated { from: DeliveryStatus::Processing, to: DeliveryStatus::Failed }
    ));

    let item = fx.item(order.items[0].id).await;
    assert_eq!(item.delivery_status, DeliveryStatus::Failed);
    assert_eq!(item.delivery_error.as_deref(), Some("Provider returned an unreadable response"));
    assert_eq!(item.delivery_content, None);
    assert_eq!(item.api_response_log["error"]["kind"], "unparseable");
    assert_eq!(fx.order_status(order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_second_sweep_does_not_touch_delivered_items() {
    let fx = fixture(ProviderKind::Tagged).await;
    fx.dispatched_order(1).await;
    fx.client.on_status("ref-1", tag_status("3", vec![DeliveredCode::new("CODE-1", None)]));

    let first = fx.sync.sweep(SweepScope::All).await.unwrap();
    let second = fx.sync.sweep(SweepScope::All).await.unwrap();

    assert_eq!(first.updated, 1);
    assert_eq!(second.checked, 0);
    assert_eq!(fx.events.events().await.len(), 1);
}

#[tokio::test]
async fn test_check_missing_item() {
    let fx = fixture(ProviderKind::Tagged).await;
    let err = fx.sync.check_item(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_balance_updates_provider() {
    let fx = fixture(ProviderKind::Tagged).await;
    let registry = ProviderRegistry::new(Arc::new(fx.store.clone()), fx.factory.clone());

    let report = registry.refresh_balance(fx.provider.id).await.unwrap();
    assert_eq!(report.balance, dec!(1520.75));

    let stored = fx.store.get_provider(fx.provider.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, Some(dec!(1520.75)));
    assert_eq!(stored.currency.as_deref(), Some("TRY"));
    assert!(stored.balance_checked_at.is_some());
}
