use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use twinguard_core_types::{CorrelationId, EnforcementError, EntityId, Signal};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),
}

impl From<BusError> for EnforcementError {
    fn from(value: BusError) -> Self {
        EnforcementError::internal(value.to_string())
    }
}

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Cluster-wide fan-out abstraction. Every enforcement node subscribes;
/// delivery is broadcast, not exactly-once.
#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-memory bus standing in for the cluster pub/sub fabric in unit tests
/// and single-node deployments.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError> {
        // A bus with no subscribers is not an error: nodes may come and go.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Extracts the acknowledgement key from a published live signal so the
/// pub/sub fabric can track at-least-once delivery.
pub type AckExtractor = Arc<dyn Fn(&Signal) -> Option<(EntityId, CorrelationId)> + Send + Sync>;

/// Outbound seam to the publish/subscribe fabric carrying live signals to
/// connected clients. The fabric itself is an external collaborator.
#[async_trait]
pub trait SignalPublisher: Send + Sync {
    async fn publish(&self, signal: Signal, ack: Option<AckExtractor>) -> Result<(), BusError>;
}

/// Publishes live signals onto an in-memory bus; acknowledgement tracking is
/// left to the subscriber side.
pub struct InMemorySignalPublisher {
    bus: Arc<InMemoryBus<Signal>>,
}

impl InMemorySignalPublisher {
    pub fn new(bus: Arc<InMemoryBus<Signal>>) -> Arc<Self> {
        Arc::new(Self { bus })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.bus.subscribe()
    }
}

#[async_trait]
impl SignalPublisher for InMemorySignalPublisher {
    async fn publish(&self, signal: Signal, ack: Option<AckExtractor>) -> Result<(), BusError> {
        if let Some(extract) = ack {
            if let Some((entity, correlation)) = extract(&signal) {
                tracing::debug!(target: "event_bus", %entity, %correlation, "live signal requires acknowledgement");
            }
        }
        self.bus.publish(signal).await
    }
}
