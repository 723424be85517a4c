use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pinbox_order::{FulfillmentError, LedgerError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// A provider failed or answered with an error.
    BadGateway(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput(msg) => AppError::ValidationError(msg),
            LedgerError::NotFound(msg) => AppError::NotFoundError(msg),
            e @ LedgerError::AlreadyProcessed { .. } => AppError::ConflictError(e.to_string()),
            LedgerError::Storage(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            e @ (FulfillmentError::NotFound(_) | FulfillmentError::ProviderNotFound(_)) => {
                AppError::NotFoundError(e.to_string())
            }
            e @ (FulfillmentError::AlreadyDispatched(_) | FulfillmentError::ProviderInactive(_)) => {
                AppError::ConflictError(e.to_string())
            }
            e @ (FulfillmentError::NotBound(_) | FulfillmentError::InvalidQuantity { .. }) => {
                AppError::ValidationError(e.to_string())
            }
            FulfillmentError::Provider(e) => AppError::BadGateway(e.support_message()),
            e @ (FulfillmentError::Misconfigured { .. } | FulfillmentError::Storage(_)) => {
                AppError::InternalServerError(e.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
