use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinbox_order::finance::{
    deposit_description, DepositApproval, DepositFilter, DepositRequest, DepositStatus, LedgerError, NewDeposit,
    WalletTransaction,
};
use pinbox_order::repository::WalletRepository;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::error;
use uuid::Uuid;

pub struct StoreWalletRepository {
    pool: PgPool,
}

impl StoreWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> LedgerError {
    error!("Wallet storage error: {}", e);
    LedgerError::Storage(e.to_string())
}

const DEPOSIT_COLUMNS: &str =
    "id, user_id, amount, payment_method, proof, status, admin_note, processed_at, created_at";

#[derive(sqlx::FromRow)]
struct DepositRow {
    id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    payment_method: String,
    proof: Option<String>,
    status: String,
    admin_note: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DepositRow> for DepositRequest {
    type Error = LedgerError;

    fn try_from(row: DepositRow) -> Result<Self, LedgerError> {
        Ok(DepositRequest {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            payment_method: row.payment_method,
            proof: row.proof,
            status: row.status.parse()?,
            admin_note: row.admin_note,
            processed_at: row.processed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    description: String,
    deposit_request_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for WalletTransaction {
    fn from(row: TransactionRow) -> Self {
        WalletTransaction {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            description: row.description,
            deposit_request_id: row.deposit_request_id,
            created_at: row.created_at,
        }
    }
}

/// Lock the request row for the rest of the transaction and check it is still
/// pending.
async fn lock_pending(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<DepositRequest, LedgerError> {
    let row = sqlx::query_as::<_, DepositRow>(&format!(
        "SELECT {} FROM deposit_requests WHERE id = $1 FOR UPDATE",
        DEPOSIT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?
    .ok_or_else(|| LedgerError::NotFound(format!("deposit request {}", id)))?;

    let request = DepositRequest::try_from(row)?;
    if request.status != DepositStatus::Pending {
        return Err(LedgerError::AlreadyProcessed { id, status: request.status });
    }
    Ok(request)
}

async fn close_request(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: DepositStatus,
    admin_note: Option<&str>,
    at: DateTime<Utc>,
) -> Result<DepositRequest, LedgerError> {
    let row = sqlx::query_as::<_, DepositRow>(&format!(
        "UPDATE deposit_requests SET status = $2, processed_at = $3, admin_note = COALESCE($4, admin_note) \
         WHERE id = $1 RETURNING {}",
        DEPOSIT_COLUMNS
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(at)
    .bind(admin_note)
    .fetch_one(&mut **tx)
    .await
    .map_err(storage)?;

    DepositRequest::try_from(row)
}

#[async_trait]
impl WalletRepository for StoreWalletRepository {
    async fn create_deposit(&self, deposit: &NewDeposit) -> Result<DepositRequest, LedgerError> {
        let row = sqlx::query_as::<_, DepositRow>(&format!(
            "INSERT INTO deposit_requests (id, user_id, amount, payment_method, proof, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') RETURNING {}",
            DEPOSIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(deposit.user_id)
        .bind(deposit.amount)
        .bind(&deposit.payment_method)
        .bind(&deposit.proof)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_foreign_key_violation() {
                    return LedgerError::NotFound(format!("profile {}", deposit.user_id));
                }
            }
            storage(e)
        })?;

        DepositRequest::try_from(row)
    }

    async fn get_deposit(&self, id: Uuid) -> Result<Option<DepositRequest>, LedgerError> {
        let row = sqlx::query_as::<_, DepositRow>(&format!("SELECT {} FROM deposit_requests WHERE id = $1", DEPOSIT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.map(DepositRequest::try_from).transpose()
    }

    async fn list_deposits(&self, filter: &DepositFilter) -> Result<(Vec<DepositRequest>, i64), LedgerError> {
        const WHERE: &str = "WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)";
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM deposit_requests {}", WHERE))
            .bind(filter.user_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let rows = sqlx::query_as::<_, DepositRow>(&format!(
            "SELECT {} FROM deposit_requests {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            DEPOSIT_COLUMNS, WHERE
        ))
        .bind(filter.user_id)
        .bind(status)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let deposits = rows
            .into_iter()
            .map(DepositRequest::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((deposits, total))
    }

    async fn approve_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositApproval, LedgerError> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(storage)?;

        lock_pending(&mut tx, id).await?;
        let request = close_request(&mut tx, id, DepositStatus::Approved, admin_note, at).await?;

        let transaction = sqlx::query_as::<_, TransactionRow>(
            "INSERT INTO wallet_transactions (id, user_id, amount, description, deposit_request_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, amount, description, deposit_request_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.amount)
        .bind(deposit_description(&request))
        .bind(request.id)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;

        let new_balance: Decimal = sqlx::query_scalar(
            "UPDATE profiles SET wallet_balance = wallet_balance + $1 WHERE id = $2 RETURNING wallet_balance",
        )
        .bind(request.amount)
        .bind(request.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?
        .ok_or_else(|| LedgerError::NotFound(format!("profile {}", request.user_id)))?;

        tx.commit().await.map_err(storage)?;

        Ok(DepositApproval {
            request,
            transaction: transaction.into(),
            new_balance,
        })
    }

    async fn reject_deposit(
        &self,
        id: Uuid,
        admin_note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DepositRequest, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        lock_pending(&mut tx, id).await?;
        let request = close_request(&mut tx, id, DepositStatus::Rejected, admin_note, at).await?;

        tx.commit().await.map_err(storage)?;
        Ok(request)
    }

    async fn update_note(&self, id: Uuid, admin_note: &str) -> Result<Option<DepositRequest>, LedgerError> {
        let row = sqlx::query_as::<_, DepositRow>(&format!(
            "UPDATE deposit_requests SET admin_note = $2 WHERE id = $1 RETURNING {}",
            DEPOSIT_COLUMNS
        ))
        .bind(id)
        .bind(admin_note)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(DepositRequest::try_from).transpose()
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Option<Decimal>, LedgerError> {
        sqlx::query_scalar("SELECT wallet_balance FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)
    }

    async fn ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, LedgerError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, user_id, amount, description, deposit_request_id, created_at \
             FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(WalletTransaction::from).collect())
    }
}
