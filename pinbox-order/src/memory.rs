//! In-memory implementations of the repository ports, used by tests and by the
//! API when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinbox_core::notify::EventPublisher;
use pinbox_core::{CoreError, CoreResult};
use pinbox_shared::DomainEvent;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::finance::{
    deposit_description, DepositApproval, DepositFilter, DepositRequest, DepositStatus, LedgerError, NewDeposit,
    WalletTransaction,
};
use crate::models::{
    ApiProvider, DeliveryStatus, DeliveryUpdate, Order, OrderItem, OrderStatus, ProductBinding, SweepScope,
};
use crate::repository::{OrderRepository, ProviderRepository, WalletRepository};

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    bindings: HashMap<Uuid, ProductBinding>,
    providers: Vec<ApiProvider>,
    deposits: Vec<DepositRequest>,
    transactions: Vec<WalletTransaction>,
    balances: HashMap<Uuid, Decimal>,
}

impl State {
    fn item_mut(&mut self, id: Uuid) -> Option<&mut OrderItem> {
        self.orders
            .iter_mut()
            .flat_map(|o| o.items.iter_mut())
            .find(|i| i.id == id)
    }

    fn deposit_mut(&mut self, id: Uuid) -> Option<&mut DepositRequest> {
        self.deposits.iter_mut().find(|d| d.id == id)
    }
}

/// Every write goes through one mutex, which stands in for row locks and
/// transactions.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.push(order);
    }

    pub async fn insert_binding(&self, binding: ProductBinding) {
        self.state.lock().await.bindings.insert(binding.product_id, binding);
    }

    pub async fn insert_provider(&self, provider: ApiProvider) {
        let mut state = self.state.lock().await;
        state.providers.retain(|p| p.id != provider.id);
        state.providers.push(provider);
    }

    /// Create a wallet profile with a starting balance.
    pub async fn insert_profile(&self, user_id: Uuid, balance: Decimal) {
        self.state.lock().await.balances.insert(user_id, balance);
    }

    /// Create a profile whose balance is backed by one opening ledger row.
    pub async fn seed_ledger(&self, user_id: Uuid, opening: Decimal) {
        let mut state = self.state.lock().await;
        state.balances.insert(user_id, opening);
        state.transactions.push(WalletTransaction {
            id: Uuid::new_v4(),
            user_id,
            amount: opening,
            description: "Opening balance".to_string(),
            deposit_request_id: None,
            created_at: Utc::now(),
        });
    }

    pub async fn transactions(&self) -> Vec<WalletTransaction> {
        self.state.lock().await.transactions.clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn get_item(&self, id: Uuid) -> CoreResult<Option<OrderItem>> {
        let mut state = self.state.lock().await;
        Ok(state.item_mut(id).map(|i| i.clone()))
    }

    async fn product_binding(&self, product_id: Uuid) -> CoreResult<Option<ProductBinding>> {
        Ok(self.state.lock().await.bindings.get(&product_id).cloned())
    }

    async fn awaiting_delivery(&self, scope: SweepScope) -> CoreResult<Vec<OrderItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<OrderItem> = state
            .orders
            .iter()
            .flat_map(|o| o.items.iter())
            .filter(|i| i.api_order_id.is_some() && !i.delivery_status.is_terminal())
            .filter(|i| match scope {
                SweepScope::All => true,
                SweepScope::Order(id) => i.order_id == id,
                SweepScope::Item(id) => i.id == id,
            })
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn record_delivery(
        &self,
        item_id: Uuid,
        expected: DeliveryStatus,
        update: &DeliveryUpdate,
    ) -> CoreResult<bool> {
        let mut state = self.state.lock().await;
        let item = state
            .item_mut(item_id)
            .ok_or_else(|| CoreError::NotFound(format!("order item {}", item_id)))?;

        if item.delivery_status != expected {
            return Ok(false);
        }
        item.apply(update);
        Ok(true)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", id)))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for InMemoryStore {
    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<ApiProvider>> {
        let state = self.state.lock().await;
        Ok(state.providers.iter().find(|p| p.id == id).cloned())
    }

    async fn list_providers(&self) -> CoreResult<Vec<ApiProvider>> {
        Ok(self.state.lock().await.providers.clone())
    }

    async fn update_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        currency: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let provider = state
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("provider {}", id)))?;
        provider.balance = Some(balance);
        if let Some(currency) = currency {
            provider.currency = Some(currency.to_string());
        }
        provider.balance_checked_at = Some(checked_at);
        Ok(())
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn create_deposit(&self, deposit: &NewDeposit) -> Result<DepositRequest, LedgerError> {
        let mut state = self.state.lock().await;
        if !state.balances.contains_key(&deposit.user_id) {
            return Err(LedgerError::NotFound(format!("profile {}", deposit.user_id)));
        }
        let request = DepositRequest {
            id: Uuid::new_v4(),
            user_id: deposit.user_id,
            amount: deposit.amount,
            payment_method: deposit.payment_method.clone(),
            proof: deposit.proof.clone(),
            status: DepositStatus::Pending,
            admin_note: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        state.deposits.push(request.clone());
        Ok(request)
    }

    async fn get_deposit(&self, id: Uuid) -> Result<Option<DepositRequest>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.deposits.iter().find(|d| d.id == id).cloned())
    }

    async fn list_deposits(&self, filter: &DepositFilter) -> Result<(Vec<DepositRequest>, i64), LedgerError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&DepositRequest> = state
            .deposits
            .iter()
            .filter(|d| filter.user_id.map_or(true, |u| d.user_id == u))
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn approve_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositApproval, LedgerError> {
        let mut state = self.state.lock().await;

        let request = state
            .deposits
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("deposit request {}", id)))?;
        if request.status != DepositStatus::Pending {
            return Err(LedgerError::AlreadyProcessed { id, status: request.status });
        }
        let current = *state
            .balances
            .get(&request.user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("profile {}", request.user_id)))?;

        let new_balance = current + request.amount;
        state.balances.insert(request.user_id, new_balance);

        let Some(stored) = state.deposit_mut(id) else {
            return Err(LedgerError::NotFound(format!("deposit request {}", id)));
        };
        stored.status = DepositStatus::Approved;
        stored.processed_at = Some(at);
        if let Some(note) = admin_note {
            stored.admin_note = Some(note.to_string());
        }
        let request = stored.clone();

        let transaction = WalletTransaction {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            amount: request.amount,
            description: deposit_description(&request),
            deposit_request_id: Some(request.id),
            created_at: at,
        };
        state.transactions.push(transaction.clone());

        Ok(DepositApproval { request, transaction, new_balance })
    }

    async fn reject_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositRequest, LedgerError> {
        let mut state = self.state.lock().await;
        let stored = state
            .deposit_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("deposit request {}", id)))?;

        if stored.status != DepositStatus::Pending {
            return Err(LedgerError::AlreadyProcessed { id, status: stored.status });
        }
        stored.status = DepositStatus::Rejected;
        stored.processed_at = Some(at);
        if let Some(note) = admin_note {
            stored.admin_note = Some(note.to_string());
        }
        Ok(stored.clone())
    }

    async fn update_note(&self, id: Uuid, admin_note: &str) -> Result<Option<DepositRequest>, LedgerError> {
        let mut state = self.state.lock().await;
        Ok(state.deposit_mut(id).map(|d| {
            d.admin_note = Some(admin_note.to_string());
            d.clone()
        }))
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Option<Decimal>, LedgerError> {
        Ok(self.state.lock().await.balances.get(&user_id).copied())
    }

    async fn ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Publisher that keeps every event in memory.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::WalletLedgerService;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn ledger_service(store: &InMemoryStore) -> (WalletLedgerService, RecordingPublisher) {
        let events = RecordingPublisher::new();
        let service = WalletLedgerService::new(Arc::new(store.clone()), Arc::new(events.clone()));
        (service, events)
    }

    #[tokio::test]
    async fn test_approval_credits_wallet_once() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.seed_ledger(user, dec!(50.00)).await;
        let (service, events) = ledger_service(&store);

        let deposit = service.create_deposit(user, &json!("100.00"), "bank_transfer", None).await.unwrap();
        let approval = service.approve(deposit.id, Some("checked")).await.unwrap();

        assert_eq!(approval.new_balance, dec!(150.00));
        assert_eq!(approval.request.status, DepositStatus::Approved);
        assert!(approval.request.processed_at.is_some());

        let rows: Vec<_> = service
            .ledger(user)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.deposit_request_id == Some(deposit.id))
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(100.00));
        assert!(rows[0].description.contains("bank_transfer"));

        let check = service.verify_balance(user).await.unwrap();
        assert!(check.consistent);
        assert_eq!(check.ledger_total, dec!(150.00));

        assert!(matches!(events.events().await.as_slice(), [DomainEvent::DepositApproved(_)]));
    }

    #[tokio::test]
    async fn test_second_approval_is_refused() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.seed_ledger(user, dec!(50.00)).await;
        let (service, _) = ledger_service(&store);

        let deposit = service.create_deposit(user, &json!(100), "bank_transfer", None).await.unwrap();
        service.approve(deposit.id, None).await.unwrap();

        let err = service.approve(deposit.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyProcessed { status: DepositStatus::Approved, .. }));
        assert_eq!(service.balance(user).await.unwrap(), dec!(150.00));
        assert_eq!(store.transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_leaves_balance_alone() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_profile(user, dec!(0)).await;
        let (service, events) = ledger_service(&store);

        let deposit = service.create_deposit(user, &json!("25"), "ewallet", Some("ref-881".into())).await.unwrap();
        let rejected = service.reject(deposit.id, Some("no transfer found")).await.unwrap();

        assert_eq!(rejected.status, DepositStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("no transfer found"));
        assert_eq!(service.balance(user).await.unwrap(), dec!(0));
        assert!(service.ledger(user).await.unwrap().is_empty());
        assert!(matches!(
            service.approve(deposit.id, None).await,
            Err(LedgerError::AlreadyProcessed { .. })
        ));
        assert!(matches!(events.events().await.as_slice(), [DomainEvent::DepositRejected(_)]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_approvals_credit_once() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.seed_ledger(user, dec!(50.00)).await;
        let (service, events) = ledger_service(&store);
        let other = WalletLedgerService::new(Arc::new(store.clone()), Arc::new(events.clone()));

        let deposit = service.create_deposit(user, &json!("100.00"), "bank_transfer", None).await.unwrap();
        let (first, second) = tokio::join!(service.approve(deposit.id, None), other.approve(deposit.id, None));

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LedgerError::AlreadyProcessed { status: DepositStatus::Approved, .. })))
                .count(),
            1
        );

        let credits = store
            .transactions()
            .await
            .into_iter()
            .filter(|t| t.deposit_request_id == Some(deposit.id))
            .count();
        assert_eq!(credits, 1);

        let check = service.verify_balance(user).await.unwrap();
        assert!(check.consistent);
        assert_eq!(check.wallet_balance, dec!(150.00));
        assert_eq!(events.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_deposit_needs_profile() {
        let store = InMemoryStore::new();
        let (service, _) = ledger_service(&store);

        let err = service.create_deposit(Uuid::new_v4(), &json!(10), "bank_transfer", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let (rows, total) = service.list_deposits(&DepositFilter::default()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_invalid_amount_is_not_persisted() {
        let store = InMemoryStore::new();
        let (service, _) = ledger_service(&store);

        let err = service.create_deposit(Uuid::new_v4(), &json!("-3"), "bank_transfer", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        let (rows, total) = service.list_deposits(&DepositFilter::default()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_note_patch_in_any_state() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_profile(user, dec!(0)).await;
        let (service, _) = ledger_service(&store);

        let deposit = service.create_deposit(user, &json!(5), "bank_transfer", None).await.unwrap();
        service.approve(deposit.id, None).await.unwrap();

        let patch = crate::finance::DepositPatch { status: None, admin_note: Some("late receipt".into()) };
        let patched = service.apply_patch(deposit.id, &patch).await.unwrap();
        assert_eq!(patched.status, DepositStatus::Approved);
        assert_eq!(patched.admin_note.as_deref(), Some("late receipt"));
    }

    #[tokio::test]
    async fn test_list_filters_and_counts() {
        let store = InMemoryStore::new();
        let (service, _) = ledger_service(&store);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.insert_profile(alice, dec!(0)).await;
        store.insert_profile(bob, dec!(0)).await;

        for _ in 0..3 {
            service.create_deposit(alice, &json!(1), "bank_transfer", None).await.unwrap();
        }
        service.create_deposit(bob, &json!(1), "bank_transfer", None).await.unwrap();

        let filter = DepositFilter { user_id: Some(alice), per_page: Some(2), ..Default::default() };
        let (rows, total) = service.list_deposits(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|d| d.user_id == alice));
    }
}
