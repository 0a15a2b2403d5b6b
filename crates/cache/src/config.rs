use std::time::Duration;

/// Sizing and freshness knobs for one cache tier.
///
/// The TTL doubles as the backstop against a lost invalidation broadcast: a
/// stale entry heals within one TTL period even if no invalidation arrives.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}
