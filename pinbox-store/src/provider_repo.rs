use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinbox_core::supplier::ProviderKind;
use pinbox_core::{CoreError, CoreResult};
use pinbox_order::models::ApiProvider;
use pinbox_order::repository::ProviderRepository;
use pinbox_shared::Masked;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::order_repo::db_err;

pub struct StoreProviderRepository {
    pool: PgPool,
}

impl StoreProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: Uuid,
    name: String,
    kind: String,
    base_url: String,
    api_key: String,
    is_active: bool,
    balance: Option<Decimal>,
    currency: Option<String>,
    balance_checked_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProviderRow> for ApiProvider {
    type Error = CoreError;

    fn try_from(row: ProviderRow) -> CoreResult<Self> {
        Ok(ApiProvider {
            id: row.id,
            name: row.name,
            kind: row.kind.parse::<ProviderKind>()?,
            base_url: row.base_url,
            api_key: Masked(row.api_key),
            is_active: row.is_active,
            balance: row.balance,
            currency: row.currency,
            balance_checked_at: row.balance_checked_at,
        })
    }
}

const PROVIDER_COLUMNS: &str =
    "id, name, kind, base_url, api_key, is_active, balance, currency, balance_checked_at";

#[async_trait]
impl ProviderRepository for StoreProviderRepository {
    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<ApiProvider>> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!("SELECT {} FROM api_providers WHERE id = $1", PROVIDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(ApiProvider::try_from).transpose()
    }

    async fn list_providers(&self) -> CoreResult<Vec<ApiProvider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(&format!("SELECT {} FROM api_providers ORDER BY name", PROVIDER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(ApiProvider::try_from).collect()
    }

    async fn update_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        currency: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE api_providers SET balance = $1, currency = COALESCE($2, currency), balance_checked_at = $3 WHERE id = $4",
        )
        .bind(balance)
        .bind(currency)
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("provider {}", id)));
        }
        Ok(())
    }
}
