use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

pub const ADMIN_ROLES: [&str; 2] = ["ADMIN", "SUPER_ADMIN"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

/// Requires a Bearer JWT (HS256) whose role is an operator role. The claims
/// are put into the request extensions.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::AuthenticationError("Expected a Bearer token".to_string()))?;

    let token_data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

    if !ADMIN_ROLES.contains(&token_data.claims.role.as_str()) {
        return Err(AppError::AuthorizationError(format!(
            "Role {} may not access operator endpoints",
            token_data.claims.role
        )));
    }

    tracing::debug!("Operator {} authorized", token_data.claims.sub);
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
