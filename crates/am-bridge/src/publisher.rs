use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::event_bus::EventBus;
use crate::protocol::BridgeMessage;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event channel unavailable: {0}")]
    Unavailable(String),
}

/// Sink for lifecycle events. Callers treat failures as advisory.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, msg: BridgeMessage) -> Result<(), PublishError>;
}

/// Publishes onto one named [`EventBus`] channel.
#[derive(Clone)]
pub struct BusPublisher {
    bus: EventBus,
    channel: String,
}

impl BusPublisher {
    pub fn new(bus: EventBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(&self, msg: BridgeMessage) -> Result<(), PublishError> {
        let receivers = self.bus.publish(&self.channel, msg);
        debug!(channel = %self.channel, receivers, "event published");
        Ok(())
    }
}
