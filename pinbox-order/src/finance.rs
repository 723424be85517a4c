use chrono::{DateTime, Utc};
use pinbox_core::notify::EventPublisher;
use pinbox_shared::models::events::{MSG_DEPOSIT_APPROVED, MSG_DEPOSIT_REJECTED};
use pinbox_shared::{DepositApprovedEvent, DepositRejectedEvent, DomainEvent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repository::WalletRepository;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest amount a `NUMERIC(14,2)` money column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Approved,
    Rejected,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Approved => "approved",
            DepositStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepositStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DepositStatus::Pending),
            "approved" => Ok(DepositStatus::Approved),
            "rejected" => Ok(DepositStatus::Rejected),
            other => Err(LedgerError::InvalidInput(format!("unknown deposit status: {}", other))),
        }
    }
}

/// A user's claim of a manual payment, waiting for an operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepositRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub proof: Option<String>,
    pub status: DepositStatus,
    pub admin_note: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Immutable ledger row. The sum of a user's rows is their balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub deposit_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Everything an approval wrote, as committed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepositApproval {
    pub request: DepositRequest,
    pub transaction: WalletTransaction,
    pub new_balance: Decimal,
}

/// Validated input for a new deposit request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeposit {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub proof: Option<String>,
}

impl NewDeposit {
    pub fn validate(
        user_id: Uuid,
        amount: &serde_json::Value,
        payment_method: &str,
        proof: Option<String>,
    ) -> Result<Self, LedgerError> {
        let amount = parse_amount(amount)?;

        let payment_method = payment_method.trim();
        if payment_method.is_empty() {
            return Err(LedgerError::InvalidInput("payment method is required".to_string()));
        }

        Ok(Self {
            user_id,
            amount,
            payment_method: payment_method.to_string(),
            proof: proof.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        })
    }
}

/// Accepts a JSON number or numeric string; the result must be positive, fit
/// the money column and have at most two decimal places.
pub fn parse_amount(value: &serde_json::Value) -> Result<Decimal, LedgerError> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => {
            return Err(LedgerError::InvalidInput("amount is required".to_string()))
        }
        _ => return Err(LedgerError::InvalidInput("amount must be a number".to_string())),
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| LedgerError::InvalidInput(format!("amount is not a number: {}", text)))?;

    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput("amount must be positive".to_string()));
    }
    if amount.normalize().scale() > 2 {
        return Err(LedgerError::InvalidInput("amount has more than two decimal places".to_string()));
    }
    if amount > max_amount() {
        return Err(LedgerError::InvalidInput(format!("amount exceeds {}", max_amount())));
    }

    Ok(amount.round_dp(2))
}

/// Ledger description for the credit created by approving `request`.
pub fn deposit_description(request: &DepositRequest) -> String {
    format!("Wallet deposit via {} (request {})", request.payment_method, request.id)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepositFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<DepositStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl DepositFilter {
    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) as i64 - 1) * self.limit()
    }
}

/// Operator patch on a deposit: a status transition and/or a note.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepositPatch {
    pub status: Option<DepositStatus>,
    pub admin_note: Option<String>,
}

/// Cached balance next to the ledger sum it must equal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceCheck {
    pub user_id: Uuid,
    pub wallet_balance: Decimal,
    pub ledger_total: Decimal,
    pub consistent: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deposit request {id} was already {status}")]
    AlreadyProcessed { id: Uuid, status: DepositStatus },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Deposit approval/rejection and wallet queries.
pub struct WalletLedgerService {
    repo: Arc<dyn WalletRepository>,
    events: Arc<dyn EventPublisher>,
}

impl WalletLedgerService {
    pub fn new(repo: Arc<dyn WalletRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { repo, events }
    }

    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        amount: &serde_json::Value,
        payment_method: &str,
        proof: Option<String>,
    ) -> Result<DepositRequest, LedgerError> {
        let deposit = NewDeposit::validate(user_id, amount, payment_method, proof)?;
        let created = self.repo.create_deposit(&deposit).await?;
        info!("Deposit request {} created for user {}: {}", created.id, created.user_id, created.amount);
        Ok(created)
    }

    pub async fn get_deposit(&self, id: Uuid) -> Result<DepositRequest, LedgerError> {
        self.repo
            .get_deposit(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("deposit request {}", id)))
    }

    pub async fn list_deposits(&self, filter: &DepositFilter) -> Result<(Vec<DepositRequest>, i64), LedgerError> {
        self.repo.list_deposits(filter).await
    }

    pub async fn approve(&self, id: Uuid, admin_note: Option<&str>) -> Result<DepositApproval, LedgerError> {
        let approval = self.repo.approve_deposit(id, admin_note, Utc::now()).await?;
        info!(
            "Deposit {} approved: user {} credited {} (balance {})",
            id, approval.request.user_id, approval.transaction.amount, approval.new_balance
        );

        self.emit(DomainEvent::DepositApproved(DepositApprovedEvent {
            deposit_id: approval.request.id,
            user_id: approval.request.user_id,
            amount: approval.transaction.amount,
            new_balance: approval.new_balance,
            message_key: MSG_DEPOSIT_APPROVED.to_string(),
            timestamp: Utc::now().timestamp(),
        }))
        .await;

        Ok(approval)
    }

    pub async fn reject(&self, id: Uuid, admin_note: Option<&str>) -> Result<DepositRequest, LedgerError> {
        let request = self.repo.reject_deposit(id, admin_note, Utc::now()).await?;
        info!("Deposit {} rejected for user {}", id, request.user_id);

        self.emit(DomainEvent::DepositRejected(DepositRejectedEvent {
            deposit_id: request.id,
            user_id: request.user_id,
            admin_note: request.admin_note.clone(),
            message_key: MSG_DEPOSIT_REJECTED.to_string(),
            timestamp: Utc::now().timestamp(),
        }))
        .await;

        Ok(request)
    }

    pub async fn update_note(&self, id: Uuid, admin_note: &str) -> Result<DepositRequest, LedgerError> {
        self.repo
            .update_note(id, admin_note)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("deposit request {}", id)))
    }

    /// Apply an operator patch. A status change goes through approve/reject;
    /// a note-only patch is allowed in any state.
    pub async fn apply_patch(&self, id: Uuid, patch: &DepositPatch) -> Result<DepositRequest, LedgerError> {
        let note = patch.admin_note.as_deref();
        match (patch.status, note) {
            (Some(DepositStatus::Approved), note) => Ok(self.approve(id, note).await?.request),
            (Some(DepositStatus::Rejected), note) => self.reject(id, note).await,
            (Some(DepositStatus::Pending), _) => Err(LedgerError::InvalidInput(
                "a deposit request cannot be moved back to pending".to_string(),
            )),
            (None, Some(note)) => self.update_note(id, note).await,
            (None, None) => Err(LedgerError::InvalidInput("nothing to update".to_string())),
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, LedgerError> {
        self.repo
            .wallet_balance(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("profile {}", user_id)))
    }

    pub async fn ledger(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, LedgerError> {
        self.repo.ledger(user_id).await
    }

    pub async fn verify_balance(&self, user_id: Uuid) -> Result<BalanceCheck, LedgerError> {
        let wallet_balance = self.balance(user_id).await?;
        let ledger_total: Decimal = self.repo.ledger(user_id).await?.iter().map(|t| t.amount).sum();

        if wallet_balance != ledger_total {
            warn!(
                "Wallet balance drift for user {}: cached {} vs ledger {}",
                user_id, wallet_balance, ledger_total
            );
        }

        Ok(BalanceCheck {
            user_id,
            wallet_balance,
            ledger_total,
            consistent: wallet_balance == ledger_total,
        })
    }

    async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!("Failed to publish {}: {}", event.topic(), e);
        }
    }
}
