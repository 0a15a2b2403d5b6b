use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use twinguard_cache::CacheInvalidator;
use twinguard_core_types::{EnforcementError, EnforcerKey, Recipient, Signal, SignalKind};
use twinguard_event_bus::SignalPublisher;

use crate::retriever::EnforcerRetriever;

/// Shared infrastructure handed to every request: the cache tiers behind the
/// retriever, the cluster invalidator and the live-signal pub/sub handle.
pub struct EnforcementInfra {
    pub retriever: Arc<EnforcerRetriever>,
    pub invalidator: Arc<CacheInvalidator>,
    pub publisher: Arc<dyn SignalPublisher>,
}

impl EnforcementInfra {
    pub fn new(
        retriever: Arc<EnforcerRetriever>,
        invalidator: Arc<CacheInvalidator>,
        publisher: Arc<dyn SignalPublisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            retriever,
            invalidator,
            publisher,
        })
    }
}

/// Wall-clock handle opened when a request enters enforcement and closed on
/// either outcome.
#[derive(Clone, Copy, Debug)]
pub struct EnforcementTimer {
    started_at: Instant,
}

impl EnforcementTimer {
    pub fn started() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub type ReceiverWrapper = Arc<dyn Fn(Signal) -> Signal + Send + Sync>;
pub type AskFuture = Shared<BoxFuture<'static, Signal>>;

/// Immutable-with-derivation envelope for one in-flight signal.
///
/// Created once per inbound message, derived (copied with a field changed)
/// through the pipeline, discarded after final dispatch. The entity key is
/// re-derived whenever the signal is replaced; a non-error signal without a
/// resolvable entity id is rejected at derivation time.
#[derive(Clone)]
pub struct RequestContext {
    signal: Option<Signal>,
    sender: Recipient,
    receiver: Option<Recipient>,
    receiver_wrapper: ReceiverWrapper,
    entity_key: Option<EnforcerKey>,
    ask_future: Option<AskFuture>,
    timer: EnforcementTimer,
    infra: Arc<EnforcementInfra>,
}

impl RequestContext {
    pub fn new(
        signal: Signal,
        sender: Recipient,
        infra: Arc<EnforcementInfra>,
    ) -> Result<Self, EnforcementError> {
        let entity_key = derive_entity_key(&signal)?;
        Ok(Self {
            signal: Some(signal),
            sender,
            receiver: None,
            receiver_wrapper: identity_wrapper(),
            entity_key,
            ask_future: None,
            timer: EnforcementTimer::started(),
            infra,
        })
    }

    /// Replaces the in-flight signal, re-deriving the entity key.
    pub fn with_signal(mut self, signal: Signal) -> Result<Self, EnforcementError> {
        self.entity_key = derive_entity_key(&signal)?;
        self.signal = Some(signal);
        Ok(self)
    }

    pub fn with_receiver(mut self, receiver: Option<Recipient>) -> Self {
        self.receiver = receiver;
        self
    }

    /// Routes the eventual result back to the original sender.
    pub fn reply_to_sender(self) -> Self {
        let sender = self.sender.clone();
        self.with_receiver(Some(sender))
    }

    /// Explicit "no response" path for fire-and-forget signals.
    pub fn drop_response(mut self) -> Self {
        self.receiver = None;
        self
    }

    pub fn with_receiver_wrapper(mut self, wrapper: ReceiverWrapper) -> Self {
        self.receiver_wrapper = wrapper;
        self
    }

    /// Defers the final message to an asynchronous exchange; the scheduler
    /// pipes the future's value to the receiver after the task completes.
    pub fn with_ask_future<F>(mut self, future: F) -> Self
    where
        F: std::future::Future<Output = Signal> + Send + 'static,
    {
        self.ask_future = Some(future.boxed().shared());
        self
    }

    /// Derives the context carrying a typed error response addressed back to
    /// the original sender.
    pub fn into_error_response(mut self, error: &EnforcementError) -> Self {
        let headers = self
            .signal
            .as_ref()
            .map(|signal| signal.headers.clone())
            .unwrap_or_default();
        self.signal = Some(Signal::error_response(error, headers));
        self.entity_key = None;
        self.receiver = Some(self.sender.clone());
        self.receiver_wrapper = identity_wrapper();
        self.ask_future = None;
        self
    }

    pub fn signal(&self) -> Option<&Signal> {
        self.signal.as_ref()
    }

    pub fn take_signal(&mut self) -> Option<Signal> {
        self.signal.take()
    }

    pub fn entity_key(&self) -> Option<&EnforcerKey> {
        self.entity_key.as_ref()
    }

    pub fn sender(&self) -> &Recipient {
        &self.sender
    }

    pub fn receiver(&self) -> Option<&Recipient> {
        self.receiver.as_ref()
    }

    pub fn take_ask_future(&mut self) -> Option<AskFuture> {
        self.ask_future.take()
    }

    pub fn wrap_for_receiver(&self, signal: Signal) -> Signal {
        (self.receiver_wrapper)(signal)
    }

    pub fn timer(&self) -> EnforcementTimer {
        self.timer
    }

    pub fn infra(&self) -> &Arc<EnforcementInfra> {
        &self.infra
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("signal", &self.signal.as_ref().map(|s| &s.name))
            .field("entity_key", &self.entity_key)
            .field("receiver", &self.receiver)
            .field("has_ask_future", &self.ask_future.is_some())
            .finish()
    }
}

fn identity_wrapper() -> ReceiverWrapper {
    Arc::new(|signal| signal)
}

fn derive_entity_key(signal: &Signal) -> Result<Option<EnforcerKey>, EnforcementError> {
    match signal.entity_key() {
        Some(key) => Ok(Some(key.clone())),
        // Error signals legitimately carry no entity id.
        None if signal.kind == SignalKind::Error => Ok(None),
        None => Err(EnforcementError::MissingEntityId {
            signal: signal.name.clone(),
        }),
    }
}
