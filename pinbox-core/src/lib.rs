pub mod credentials;
pub mod delivery;
pub mod notify;
pub mod scrape;
pub mod supplier;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Event publishing failed: {0}")]
    PublishError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
