//! Correlation-id keyed cache routing out-of-band command responses back to
//! the sender that issued the originating live signal.
//!
//! A live signal's response may arrive on a different node, long after the
//! handling context that produced the signal is gone. The entry stored here
//! is everything needed to finish the exchange: the original sender address
//! and the caller's authorization context, re-attached before any
//! response-filtering step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use twinguard_core_types::{AuthorizationContext, CorrelationId, Recipient, Signal};

#[derive(Clone, Debug)]
pub struct ResponseCacheConfig {
    /// Expiry applied when the originating signal declares no timeout header.
    pub fallback_ttl: Duration,
    pub sweep_interval: Duration,
    /// Whether live responses are dispatched cluster-wide or only on the node
    /// that issued the signal. Forwarded to the pub/sub collaborator; the
    /// in-memory cache treats both identically.
    pub global_dispatch: bool,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            fallback_ttl: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
            global_dispatch: true,
        }
    }
}

/// Where and as whom a correlated response must be delivered.
#[derive(Clone, Debug)]
pub struct ResponseReceiverEntry {
    pub sender: Recipient,
    pub auth_context: AuthorizationContext,
}

#[derive(Clone, Debug)]
struct Stored {
    entry: ResponseReceiverEntry,
    expires_at_ms: i64,
}

impl Stored {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// At most one live entry per correlation id; expiry is fixed at insert time
/// and reads never extend it. Entries expire lazily on read and periodically
/// via [`ResponseReceiverCache::spawn_sweeper`].
pub struct ResponseReceiverCache {
    entries: DashMap<CorrelationId, Stored>,
    config: ResponseCacheConfig,
}

impl ResponseReceiverCache {
    pub fn new(config: ResponseCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            config,
        })
    }

    pub fn global_dispatch(&self) -> bool {
        self.config.global_dispatch
    }

    /// Registers `entry` under the command's correlation id, resolving
    /// collisions with externally supplied ids by appending a random
    /// `#x<hex>` suffix until a free id is found. The command is rewritten to
    /// carry the assigned id before dispatch.
    ///
    /// Expiry is the command's timeout header, else the configured fallback.
    pub fn insert_unique(
        &self,
        command: &mut Signal,
        entry: ResponseReceiverEntry,
    ) -> CorrelationId {
        let ttl = command.headers.timeout.unwrap_or(self.config.fallback_ttl);
        let now_ms = Utc::now().timestamp_millis();
        let expires_at_ms = now_ms + ttl.as_millis() as i64;
        let original = command.correlation_id().clone();

        let mut candidate = original.clone();
        loop {
            match self.entries.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Stored {
                        entry: entry.clone(),
                        expires_at_ms,
                    });
                    break;
                }
                Entry::Occupied(mut slot) => {
                    if !slot.get().is_live(now_ms) {
                        slot.insert(Stored {
                            entry: entry.clone(),
                            expires_at_ms,
                        });
                        break;
                    }
                    candidate = CorrelationId::of(format!(
                        "{}#x{:x}",
                        original.as_str(),
                        rand::random::<u32>()
                    ));
                }
            }
        }

        if candidate != original {
            debug!(
                target: "response_cache",
                %original,
                assigned = %candidate,
                "correlation id collision, command rewritten"
            );
            command.headers.correlation_id = candidate.clone();
        }
        candidate
    }

    /// The receiver entry for `correlation_id`, if one is still live. The
    /// entry stays in place: some flows expect multiple responders for the
    /// same id, e.g. claim messages.
    pub fn get(&self, correlation_id: &CorrelationId) -> Option<ResponseReceiverEntry> {
        let now_ms = Utc::now().timestamp_millis();
        match self.entries.get(correlation_id) {
            Some(stored) if stored.is_live(now_ms) => Some(stored.entry.clone()),
            Some(stored) => {
                drop(stored);
                self.entries
                    .remove_if(correlation_id, |_, stored| !stored.is_live(now_ms));
                None
            }
            None => None,
        }
    }

    /// Drops the entry for `correlation_id`. Returns whether one was present.
    pub fn invalidate(&self, correlation_id: &CorrelationId) -> bool {
        self.entries.remove(correlation_id).is_some()
    }

    /// Re-addresses a correlated response to its original sender with the
    /// caller's authorization context re-attached. Returns false when no live
    /// entry matches or the sender's mailbox is gone.
    pub fn redirect(&self, mut response: Signal) -> bool {
        let Some(entry) = self.get(response.correlation_id()) else {
            debug!(
                target: "response_cache",
                correlation = %response.correlation_id(),
                "no pending receiver for response"
            );
            return false;
        };
        response.headers.auth_context = entry.auth_context;
        if entry.sender.tell(response) {
            true
        } else {
            warn!(
                target: "response_cache",
                sender = entry.sender.name(),
                "original sender gone, response dropped"
            );
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodic backstop for entries nobody reads again after they expire.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                let before = self.entries.len();
                self.entries.retain(|_, stored| stored.is_live(now_ms));
                let swept = before - self.entries.len();
                if swept > 0 {
                    debug!(target: "response_cache", swept, "expired receiver entries removed");
                }
            }
        })
    }
}
