pub mod models;
pub mod pii;

pub use models::events::{DomainEvent, FulfillmentCompletedEvent, DepositApprovedEvent, DepositRejectedEvent};
pub use pii::Masked;
