use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;

use twinguard_core_types::EnforcerKey;

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::errors::CacheError;
use crate::flight::Flight;
use crate::metrics;

/// Loads an entry from the authoritative store on a cache miss. Returning
/// `Nonexistent` is how a missing record becomes negatively cached.
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync {
    async fn load(&self, key: &K) -> Result<CacheEntry<V>, CacheError>;
}

#[derive(Clone)]
struct Stored<V> {
    entry: CacheEntry<V>,
    stored_at_ms: i64,
    ttl_ms: i64,
}

impl<V> Stored<V> {
    fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.stored_at_ms <= self.ttl_ms
    }
}

/// Lazily populated, explicitly invalidated cache tier with a TTL freshness
/// bound and an LRU capacity bound.
///
/// Lookups never block a worker thread: a miss suspends on the per-key
/// flight mutex and the loader future only.
pub struct TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: String,
    inner: Arc<Mutex<LruCache<K, Stored<V>>>>,
    flights: Flight<K>,
    loader: Arc<dyn CacheLoader<K, V>>,
    ttl_ms: i64,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        config: CacheConfig,
        loader: Arc<dyn CacheLoader<K, V>>,
    ) -> Self {
        let cap = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            flights: Flight::default(),
            loader,
            ttl_ms: config.ttl.as_millis() as i64,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cached entry for `key`, calling the loader on first access
    /// or after expiry. Loader failures abort the single lookup; nothing gets
    /// cached for them.
    pub async fn get(&self, key: &K) -> Result<Option<CacheEntry<V>>, CacheError> {
        if let Some(entry) = self.lookup_fresh(key) {
            metrics::record_hit(&self.name);
            return Ok(Some(entry));
        }

        let _flight = self.flights.acquire(key).await;
        if let Some(entry) = self.lookup_fresh(key) {
            metrics::record_hit(&self.name);
            return Ok(Some(entry));
        }

        metrics::record_miss(&self.name);
        metrics::record_load(&self.name);
        let loaded = self.loader.load(key).await?;
        let stored = Stored {
            entry: loaded.clone(),
            stored_at_ms: Utc::now().timestamp_millis(),
            ttl_ms: self.ttl_ms,
        };
        self.inner.lock().put(key.clone(), stored);
        Ok(Some(loaded))
    }

    /// Drops the entry for `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &K) -> bool {
        metrics::record_invalidation(&self.name);
        self.inner.lock().pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_fresh(&self, key: &K) -> Option<CacheEntry<V>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut guard = self.inner.lock();
        match guard.get(key) {
            Some(stored) if stored.is_fresh(now_ms) => Some(stored.entry.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }
}

/// The id-resolution tier: entity key to the key of the enforcer governing
/// it. `None` from `get` means the tier has no answer at all, which callers
/// treat as an invariant violation.
#[async_trait]
pub trait IdResolutionCache: Send + Sync {
    async fn get(&self, key: &EnforcerKey) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError>;
    fn invalidate(&self, key: &EnforcerKey) -> bool;
}

#[async_trait]
impl IdResolutionCache for TtlCache<EnforcerKey, EnforcerKey> {
    async fn get(&self, key: &EnforcerKey) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError> {
        TtlCache::get(self, key).await
    }

    fn invalidate(&self, key: &EnforcerKey) -> bool {
        TtlCache::invalidate(self, key)
    }
}
