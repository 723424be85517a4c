use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinbox_core::{CoreError, CoreResult};
use pinbox_order::models::{
    DeliveryStatus, DeliveryUpdate, Order, OrderItem, OrderStatus, ProductBinding, SweepScope,
};
use pinbox_order::repository::OrderRepository;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::InternalError(format!("database error: {}", e))
}

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, target_account, customer_note, \
     delivery_status, delivery_content, delivery_error, api_provider_id, api_order_id, api_response_log, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<Uuid>,
    customer_email: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    target_account: Option<String>,
    customer_note: Option<String>,
    delivery_status: String,
    delivery_content: Option<String>,
    delivery_error: Option<String>,
    api_provider_id: Option<Uuid>,
    api_order_id: Option<String>,
    api_response_log: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = CoreError;

    fn try_from(row: OrderItemRow) -> CoreResult<Self> {
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            target_account: row.target_account,
            customer_note: row.customer_note,
            delivery_status: row.delivery_status.parse()?,
            delivery_content: row.delivery_content,
            delivery_error: row.delivery_error,
            api_provider_id: row.api_provider_id,
            api_order_id: row.api_order_id,
            api_response_log: row.api_response_log,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    id: Uuid,
    api_provider_id: Option<Uuid>,
    api_product_ref: Option<String>,
    api_category_ref: Option<String>,
    pre_order: bool,
    tier: Option<String>,
}

fn items_from_rows(rows: Vec<OrderItemRow>) -> CoreResult<Vec<OrderItem>> {
    rows.into_iter().map(OrderItem::try_from).collect()
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, customer_email, status, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Some(Order {
            id: row.id,
            user_id: row.user_id,
            customer_email: row.customer_email,
            status: row.status.parse::<OrderStatus>()?,
            items: items_from_rows(item_rows)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn get_item(&self, id: Uuid) -> CoreResult<Option<OrderItem>> {
        let row = sqlx::query_as::<_, OrderItemRow>(&format!("SELECT {} FROM order_items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(OrderItem::try_from).transpose()
    }

    async fn product_binding(&self, product_id: Uuid) -> CoreResult<Option<ProductBinding>> {
        let row = sqlx::query_as::<_, BindingRow>(
            "SELECT id, api_provider_id, api_product_ref, api_category_ref, pre_order, tier FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        // A product without both a provider and a provider-side reference is not bound.
        Ok(row.and_then(|r| {
            Some(ProductBinding {
                product_id: r.id,
                api_provider_id: r.api_provider_id?,
                api_product_ref: r.api_product_ref.filter(|s| !s.trim().is_empty())?,
                api_category_ref: r.api_category_ref,
                pre_order: r.pre_order,
                tier: r.tier,
            })
        }))
    }

    async fn awaiting_delivery(&self, scope: SweepScope) -> CoreResult<Vec<OrderItem>> {
        let base = format!(
            "SELECT {} FROM order_items \
             WHERE api_order_id IS NOT NULL AND delivery_status IN ('pending', 'processing')",
            ITEM_COLUMNS
        );

        let sql = match scope {
            SweepScope::All => format!("{} ORDER BY created_at, id", base),
            SweepScope::Order(_) => format!("{} AND order_id = $1 ORDER BY created_at, id", base),
            SweepScope::Item(_) => format!("{} AND id = $1", base),
        };

        let mut query = sqlx::query_as::<_, OrderItemRow>(&sql);
        if let SweepScope::Order(id) | SweepScope::Item(id) = scope {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;

        items_from_rows(rows)
    }

    async fn record_delivery(
        &self,
        item_id: Uuid,
        expected: DeliveryStatus,
        update: &DeliveryUpdate,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE order_items
            SET delivery_status = $1,
                delivery_content = $2,
                delivery_error = $3,
                api_provider_id = COALESCE($4, api_provider_id),
                api_order_id = COALESCE($5, api_order_id),
                api_response_log = $6,
                updated_at = NOW()
            WHERE id = $7 AND delivery_status = $8
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.content)
        .bind(&update.error)
        .bind(update.api_provider_id)
        .bind(&update.api_order_id)
        .bind(&update.response_log)
        .bind(item_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> CoreResult<()> {
        sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
