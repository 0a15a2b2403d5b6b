use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use twinguard_core_types::EnforcerKey;
use twinguard_event_bus::EventBus;

use crate::errors::CacheError;
use crate::ttl::TtlCache;

/// Cluster-wide notice that the cached state for an entity key is stale.
#[derive(Clone, Debug)]
pub struct InvalidationEvent {
    pub key: EnforcerKey,
}

/// A cache tier that can discard local state for an entity key.
pub trait InvalidationTarget: Send + Sync {
    fn invalidate_local(&self, key: &EnforcerKey) -> bool;
}

impl<V> InvalidationTarget for TtlCache<EnforcerKey, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn invalidate_local(&self, key: &EnforcerKey) -> bool {
        self.invalidate(key)
    }
}

/// Pairs every local invalidation with a cluster-wide broadcast, and applies
/// broadcasts from other nodes to the local tiers.
///
/// Authorization-changing writes land on whichever node receives them, so a
/// local invalidation alone would leave every other node serving stale
/// enforcers.
pub struct CacheInvalidator {
    bus: Arc<dyn EventBus<InvalidationEvent>>,
    targets: Vec<Arc<dyn InvalidationTarget>>,
}

impl CacheInvalidator {
    pub fn new(bus: Arc<dyn EventBus<InvalidationEvent>>) -> Self {
        Self {
            bus,
            targets: Vec::new(),
        }
    }

    pub fn register(mut self, target: Arc<dyn InvalidationTarget>) -> Self {
        self.targets.push(target);
        self
    }

    /// Invalidates locally and broadcasts to the cluster. Returns whether any
    /// local tier held the key.
    pub async fn invalidate(&self, key: &EnforcerKey) -> Result<bool, CacheError> {
        let held = self.invalidate_local(key);
        self.bus
            .publish(InvalidationEvent { key: key.clone() })
            .await
            .map_err(|err| CacheError::Broadcast(err.to_string()))?;
        debug!(target: "cache", %key, held, "invalidated and broadcast");
        Ok(held)
    }

    fn invalidate_local(&self, key: &EnforcerKey) -> bool {
        let mut held = false;
        for target in &self.targets {
            held |= target.invalidate_local(key);
        }
        held
    }

    /// Applies remote invalidation events to the local tiers until the bus
    /// closes. Events from this node's own broadcasts are re-applied
    /// harmlessly.
    pub fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.invalidate_local(&event.key);
                        debug!(target: "cache", key = %event.key, "applied remote invalidation");
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(target: "cache", missed, "invalidation listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
