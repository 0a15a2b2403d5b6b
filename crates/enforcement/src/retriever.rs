use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use twinguard_cache::{CacheEntry, IdResolutionCache, TtlCache};
use twinguard_core_types::{EnforcementError, EnforcerKey, ResourceType};

use crate::enforcer::SharedEnforcer;

pub type EnforcerCache = TtlCache<EnforcerKey, SharedEnforcer>;

/// Composes the id-resolution tier with the per-resource-type enforcer caches
/// into a single asynchronous lookup.
pub struct EnforcerRetriever {
    id_cache: Arc<dyn IdResolutionCache>,
    enforcer_caches: HashMap<ResourceType, Arc<EnforcerCache>>,
}

impl EnforcerRetriever {
    pub fn new(id_cache: Arc<dyn IdResolutionCache>) -> Self {
        Self {
            id_cache,
            enforcer_caches: HashMap::new(),
        }
    }

    pub fn register(mut self, resource_type: ResourceType, cache: Arc<EnforcerCache>) -> Self {
        self.enforcer_caches.insert(resource_type, cache);
        self
    }

    pub fn id_cache(&self) -> &Arc<dyn IdResolutionCache> {
        &self.id_cache
    }

    pub fn enforcer_cache(&self, resource_type: ResourceType) -> Option<&Arc<EnforcerCache>> {
        self.enforcer_caches.get(&resource_type)
    }

    /// Resolves `entity_key` to `(id entry, enforcer entry)`.
    ///
    /// A missing id entry is an invariant violation (the id tier must always
    /// answer); an unregistered resource type is a configuration error. Both
    /// abort the single request loudly instead of degrading silently.
    pub async fn retrieve(
        &self,
        entity_key: &EnforcerKey,
    ) -> Result<(CacheEntry<EnforcerKey>, CacheEntry<SharedEnforcer>), EnforcementError> {
        let id_entry = self
            .id_cache
            .get(entity_key)
            .await
            .map_err(EnforcementError::from)?
            .ok_or_else(|| {
                error!(target: "enforcement", key = %entity_key, "id-resolution cache returned no entry");
                EnforcementError::CacheInvariant {
                    key: entity_key.to_string(),
                }
            })?;

        let enforcer_key = match id_entry.value() {
            Some(key) => key.clone(),
            None => return Ok((id_entry, CacheEntry::nonexistent())),
        };

        let cache = self
            .enforcer_caches
            .get(&enforcer_key.resource_type)
            .ok_or_else(|| {
                error!(
                    target: "enforcement",
                    resource_type = %enforcer_key.resource_type,
                    "no enforcer cache registered for resource type"
                );
                EnforcementError::UnregisteredResourceType(enforcer_key.resource_type)
            })?;

        let enforcer_entry = cache
            .get(&enforcer_key)
            .await
            .map_err(EnforcementError::from)?
            .unwrap_or(CacheEntry::Nonexistent);
        Ok((id_entry, enforcer_entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcer::CompiledEnforcer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use twinguard_cache::{CacheConfig, CacheError, CacheLoader};
    use twinguard_core_types::EntityId;

    struct EnforcerLoader {
        loads: AtomicU64,
    }

    #[async_trait]
    impl CacheLoader<EnforcerKey, SharedEnforcer> for EnforcerLoader {
        async fn load(&self, _key: &EnforcerKey) -> Result<CacheEntry<SharedEnforcer>, CacheError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(CacheEntry::exists(
                CompiledEnforcer::new().grant_read("subject:reader").shared(),
            ))
        }
    }

    /// Id tier resolving things to the policy that governs them; unknown
    /// entities are negatively cached.
    struct FixedIdCache {
        governed: EnforcerKey,
        governor: EnforcerKey,
    }

    #[async_trait]
    impl IdResolutionCache for FixedIdCache {
        async fn get(
            &self,
            key: &EnforcerKey,
        ) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError> {
            if *key == self.governed {
                Ok(Some(CacheEntry::exists(self.governor.clone())))
            } else {
                Ok(Some(CacheEntry::nonexistent()))
            }
        }

        fn invalidate(&self, _key: &EnforcerKey) -> bool {
            false
        }
    }

    /// Id tier with no answer at all, to exercise the invariant branch.
    struct EmptyIdCache;

    #[async_trait]
    impl IdResolutionCache for EmptyIdCache {
        async fn get(
            &self,
            _key: &EnforcerKey,
        ) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError> {
            Ok(None)
        }

        fn invalidate(&self, _key: &EnforcerKey) -> bool {
            false
        }
    }

    fn enforcer_cache(loader: Arc<EnforcerLoader>) -> Arc<EnforcerCache> {
        Arc::new(TtlCache::new(
            "enforcer-policy",
            CacheConfig::default(),
            loader as Arc<dyn CacheLoader<EnforcerKey, SharedEnforcer>>,
        ))
    }

    #[tokio::test]
    async fn resolves_the_governing_enforcer_through_both_tiers() {
        let thing = EnforcerKey::thing(EntityId::of("t-1"));
        let policy = EnforcerKey::policy(EntityId::of("p-1"));
        let loader = Arc::new(EnforcerLoader {
            loads: AtomicU64::new(0),
        });
        let retriever = EnforcerRetriever::new(Arc::new(FixedIdCache {
            governed: thing.clone(),
            governor: policy.clone(),
        }))
        .register(ResourceType::Policy, enforcer_cache(loader.clone()));

        let (id_entry, enforcer_entry) = retriever.retrieve(&thing).await.unwrap();
        assert_eq!(id_entry.value(), Some(&policy));
        assert!(enforcer_entry.is_existent());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nonexistent_id_entry_short_circuits_without_loading() {
        let thing = EnforcerKey::thing(EntityId::of("t-1"));
        let loader = Arc::new(EnforcerLoader {
            loads: AtomicU64::new(0),
        });
        let retriever = EnforcerRetriever::new(Arc::new(FixedIdCache {
            governed: EnforcerKey::thing(EntityId::of("t-other")),
            governor: EnforcerKey::policy(EntityId::of("p-1")),
        }))
        .register(ResourceType::Policy, enforcer_cache(loader.clone()));

        let (id_entry, enforcer_entry) = retriever.retrieve(&thing).await.unwrap();
        assert!(!id_entry.is_existent());
        assert!(!enforcer_entry.is_existent());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_id_entry_is_an_invariant_violation() {
        let retriever = EnforcerRetriever::new(Arc::new(EmptyIdCache));
        let err = retriever
            .retrieve(&EnforcerKey::thing(EntityId::of("t-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcementError::CacheInvariant { .. }));
    }

    #[tokio::test]
    async fn unregistered_resource_type_aborts_loudly() {
        let thing = EnforcerKey::thing(EntityId::of("t-1"));
        let retriever = EnforcerRetriever::new(Arc::new(FixedIdCache {
            governed: thing.clone(),
            governor: EnforcerKey::policy(EntityId::of("p-1")),
        }));

        let err = retriever.retrieve(&thing).await.unwrap_err();
        assert_eq!(
            err,
            EnforcementError::UnregisteredResourceType(ResourceType::Policy)
        );
    }
}
