use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinbox_core::CoreResult;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::finance::{DepositApproval, DepositFilter, DepositRequest, LedgerError, NewDeposit, WalletTransaction};
use crate::models::{ApiProvider, DeliveryStatus, DeliveryUpdate, Order, OrderStatus, OrderItem, ProductBinding, SweepScope};

/// Order and order item data access used by the fulfillment engine.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Order with all of its items.
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn get_item(&self, id: Uuid) -> CoreResult<Option<OrderItem>>;

    async fn product_binding(&self, product_id: Uuid) -> CoreResult<Option<ProductBinding>>;

    /// Items with a provider reference whose status is still pending or
    /// processing, oldest first.
    async fn awaiting_delivery(&self, scope: SweepScope) -> CoreResult<Vec<OrderItem>>;

    /// Write `update` only if the item is still in `expected`. Returns whether
    /// the row was written.
    async fn record_delivery(
        &self,
        item_id: Uuid,
        expected: DeliveryStatus,
        update: &DeliveryUpdate,
    ) -> CoreResult<bool>;

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> CoreResult<()>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<ApiProvider>>;

    async fn list_providers(&self) -> CoreResult<Vec<ApiProvider>>;

    async fn update_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        currency: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> CoreResult<()>;
}

/// Deposit requests, ledger rows and cached balances.
///
/// `approve_deposit` and `reject_deposit` run as one atomic unit each: lock the
/// request, re-check that it is pending, then write. Approval also appends the
/// ledger row and bumps the cached balance inside the same unit.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Fails with `NotFound` when the user has no wallet profile.
    async fn create_deposit(&self, deposit: &NewDeposit) -> Result<DepositRequest, LedgerError>;

    async fn get_deposit(&self, id: Uuid) -> Result<Option<DepositRequest>, LedgerError>;

    /// Page of requests plus the total number matching the filter.
    async fn list_deposits(&self, filter: &DepositFilter) -> Result<(Vec<DepositRequest>, i64), LedgerError>;

    async fn approve_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositApproval, LedgerError>;

    async fn reject_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositRequest, LedgerError>;

    async fn update_note(&self, id: Uuid, admin_note: &str) -> Result<Option<DepositRequest>, LedgerError>;

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Option<Decimal>, LedgerError>;

    async fn ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, LedgerError>;
}
