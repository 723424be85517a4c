use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use pinbox_order::models::ApiProvider;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub provider_id: Uuid,
    pub balance: Decimal,
    pub currency: Option<String>,
    pub checked_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/providers", get(list_providers))
        .route("/v1/admin/providers/{id}/refresh-balance", post(refresh_balance))
}

/// GET /v1/admin/providers
async fn list_providers(State(state): State<AppState>) -> Result<Json<Vec<ApiProvider>>, AppError> {
    Ok(Json(state.providers.list().await?))
}

/// POST /v1/admin/providers/{id}/refresh-balance
async fn refresh_balance(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let report = state.providers.refresh_balance(provider_id).await?;

    Ok(Json(BalanceResponse {
        provider_id,
        balance: report.balance,
        currency: report.currency,
        checked_at: Utc::now(),
    }))
}
