use thiserror::Error;
use twinguard_core_types::EnforcementError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache loader failed: {0}")]
    Loader(String),
    #[error("invalidation broadcast failed: {0}")]
    Broadcast(String),
}

impl CacheError {
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::Loader(msg.into())
    }
}

impl From<CacheError> for EnforcementError {
    fn from(value: CacheError) -> Self {
        EnforcementError::internal(value.to_string())
    }
}
