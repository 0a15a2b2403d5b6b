pub mod config;
pub mod entry;
pub mod errors;
pub mod flight;
pub mod identity;
pub mod invalidate;
pub mod metrics;
pub mod ttl;

pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use errors::CacheError;
pub use flight::Flight;
pub use identity::IdentityCache;
pub use invalidate::{CacheInvalidator, InvalidationEvent, InvalidationTarget};
pub use ttl::{CacheLoader, IdResolutionCache, TtlCache};
