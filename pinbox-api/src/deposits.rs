use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use pinbox_order::finance::{DepositFilter, DepositPatch, DepositRequest};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Deserialize)]
pub struct CreateDepositRequest {
    pub user_id: Uuid,
    /// Number or numeric string; validated by the ledger service.
    #[serde(default)]
    pub amount: serde_json::Value,
    pub payment_method: String,
    pub proof: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/wallet/deposits", get(list_deposits).post(create_deposit))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/v1/admin/wallet/deposits/{id}", patch(review_deposit))
}

/// GET /v1/wallet/deposits
async fn list_deposits(
    State(state): State<AppState>,
    Query(filter): Query<DepositFilter>,
) -> Result<impl IntoResponse, AppError> {
    let (deposits, total) = state.wallet.list_deposits(&filter).await?;
    Ok(([(TOTAL_COUNT_HEADER, total.to_string())], Json(deposits)))
}

/// POST /v1/wallet/deposits
async fn create_deposit(
    State(state): State<AppState>,
    Json(req): Json<CreateDepositRequest>,
) -> Result<(StatusCode, Json<Vec<DepositRequest>>), AppError> {
    let deposit = state
        .wallet
        .create_deposit(req.user_id, &req.amount, &req.payment_method, req.proof)
        .await?;

    Ok((StatusCode::CREATED, Json(vec![deposit])))
}

/// PATCH /v1/admin/wallet/deposits/{id}
async fn review_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DepositPatch>,
) -> Result<Json<DepositRequest>, AppError> {
    let updated = state.wallet.apply_patch(id, &patch).await?;
    tracing::info!("Deposit {} reviewed: {}", id, updated.status);
    Ok(Json(updated))
}
