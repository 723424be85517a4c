use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use pinbox_order::{DispatchOutcome, SweepReport, SweepScope};
use pinbox_store::redis_repo::SWEEP_LOCK_KEY;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub order_id: Uuid,
    pub outcomes: Vec<DispatchOutcome>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/orders/{id}/dispatch", post(dispatch_order))
        .route("/v1/admin/orders/{id}/check-delivery", post(check_order))
        .route("/v1/admin/order-items/{id}/check-delivery", post(check_item))
        .route("/v1/admin/delivery/sweep", post(sweep_all))
}

/// POST /v1/admin/orders/{id}/dispatch
async fn dispatch_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<DispatchResponse>, AppError> {
    let outcomes = state.fulfillment.dispatch_order(order_id).await?;
    Ok(Json(DispatchResponse { order_id, outcomes }))
}

/// POST /v1/admin/orders/{id}/check-delivery
async fn check_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.sync.check_order(order_id).await?))
}

/// POST /v1/admin/order-items/{id}/check-delivery
async fn check_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.sync.check_item(item_id).await?))
}

/// POST /v1/admin/delivery/sweep
async fn sweep_all(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    match run_full_sweep(&state).await? {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::ConflictError("a delivery sweep is already running".to_string())),
    }
}

/// System-wide sweep under the Redis advisory lock. `None` means another sweep
/// holds the lock. Without Redis, or when Redis fails, the sweep runs unlocked;
/// conditional item writes keep overlapping sweeps safe.
pub async fn run_full_sweep(state: &AppState) -> Result<Option<SweepReport>, AppError> {
    let token = Uuid::new_v4().to_string();

    let locked = match &state.redis {
        Some(redis) => match redis.acquire_lock(SWEEP_LOCK_KEY, &token, state.sweep_lock_ttl).await {
            Ok(true) => true,
            Ok(false) => {
                info!("Delivery sweep skipped: lock held elsewhere");
                return Ok(None);
            }
            Err(e) => {
                warn!("Sweep lock unavailable, sweeping without it: {}", e);
                false
            }
        },
        None => false,
    };

    let result = state.sync.sweep(SweepScope::All).await;

    if let (true, Some(redis)) = (locked, &state.redis) {
        if let Err(e) = redis.release_lock(SWEEP_LOCK_KEY, &token).await {
            warn!("Failed to release sweep lock: {}", e);
        }
    }

    Ok(Some(result?))
}
