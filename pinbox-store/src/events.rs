use async_trait::async_trait;
use pinbox_core::notify::EventPublisher;
use pinbox_core::{CoreError, CoreResult};
use pinbox_shared::DomainEvent;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Writes every event to the log. Used when no broker is configured.
#[derive(Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(event).map_err(|e| CoreError::PublishError(e.to_string()))?;
        info!(topic = event.topic(), key = %event.key(), "{}", payload);
        Ok(())
    }
}

/// Fans events out to in-process subscribers and the log.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
        LogPublisher.publish(event).await?;
        // No subscribers is not an error.
        if self.tx.send(event.clone()).is_err() {
            debug!("No subscribers for {}", event.topic());
        }
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaPublisher;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::error;

    #[derive(Clone)]
    pub struct KafkaPublisher {
        producer: FutureProducer,
    }

    impl KafkaPublisher {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl EventPublisher for KafkaPublisher {
        async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
            let payload = serde_json::to_string(event).map_err(|e| CoreError::PublishError(e.to_string()))?;
            let key = event.key();
            let record = FutureRecord::to(event.topic()).key(&key).payload(&payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent message to {}/{}: partition {} offset {}",
                        event.topic(),
                        key,
                        delivery.partition,
                        delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", event.topic(), e);
                    Err(CoreError::PublishError(e.to_string()))
                }
            }
        }
    }
}
