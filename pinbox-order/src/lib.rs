pub mod finance;
pub mod fulfillment;
pub mod memory;
pub mod models;
pub mod registry;
pub mod repository;
pub mod status;
pub mod sync;

pub use finance::{LedgerError, WalletLedgerService};
pub use fulfillment::{DispatchOutcome, FulfillmentError, FulfillmentService};
pub use memory::{InMemoryStore, RecordingPublisher};
pub use models::{DeliveryStatus, Order, OrderItem, OrderStatus, SweepScope};
pub use registry::{ProviderHandle, ProviderRegistry};
pub use sync::{DeliverySynchronizer, ItemOutcome, ItemResult, SweepReport};
