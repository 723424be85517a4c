use async_trait::async_trait;
use pinbox_shared::DomainEvent;

use crate::CoreResult;

/// Outbound port to the notification collaborator (email, Telegram, ...).
/// Publishing happens after state is committed; callers log failures instead
/// of undoing work.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()>;
}
