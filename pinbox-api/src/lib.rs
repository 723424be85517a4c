use axum::{
    extract::{ConnectInfo, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod deposits;
pub mod error;
pub mod fulfillment;
pub mod middleware;
pub mod providers;
pub mod state;
pub mod wallet;
pub mod worker;

pub use state::{AppState, AuthConfig, Backends};

const RATE_LIMIT_PER_MINUTE: i64 = 100;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ])
        .expose_headers([axum::http::HeaderName::from_static(deposits::TOTAL_COUNT_HEADER)]);

    let admin = Router::new()
        .merge(deposits::admin_routes())
        .merge(fulfillment::routes())
        .merge(providers::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(deposits::routes())
        .merge(wallet::routes())
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let (Some(redis), Some(ConnectInfo(addr))) =
        (&state.redis, req.extensions().get::<ConnectInfo<SocketAddr>>().cloned())
    else {
        return Ok(next.run(req).await);
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis.check_rate_limit(&key, RATE_LIMIT_PER_MINUTE, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
