use async_trait::async_trait;

use twinguard_core_types::EnforcerKey;

use crate::entry::CacheEntry;
use crate::errors::CacheError;
use crate::ttl::IdResolutionCache;

/// Id-resolution tier for entities that govern themselves: every key resolves
/// to itself and is permanently present, so nothing is stored and nothing can
/// be invalidated.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCache;

#[async_trait]
impl IdResolutionCache for IdentityCache {
    async fn get(&self, key: &EnforcerKey) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError> {
        Ok(Some(CacheEntry::exists(key.clone())))
    }

    fn invalidate(&self, _key: &EnforcerKey) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinguard_core_types::EntityId;

    #[tokio::test]
    async fn every_key_is_permanently_present() {
        let cache = IdentityCache;
        let key = EnforcerKey::policy(EntityId::of("p-1"));

        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.value(), Some(&key));
        assert!(!cache.invalidate(&key));
    }
}
