use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use pinbox_order::finance::{BalanceCheck, WalletTransaction};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/wallet/{user_id}/balance", get(get_balance))
        .route("/v1/wallet/{user_id}/transactions", get(list_transactions))
}

/// GET /v1/wallet/{user_id}/balance
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalanceCheck>, AppError> {
    Ok(Json(state.wallet.verify_balance(user_id).await?))
}

/// GET /v1/wallet/{user_id}/transactions
async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<WalletTransaction>>, AppError> {
    Ok(Json(state.wallet.ledger(user_id).await?))
}
