use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{EntityId, ResourceType};

/// Domain error taxonomy shared by every enforcement crate.
///
/// Errors below the `enforce_safely` boundary are converted into an error
/// response signal addressed to the original sender; this type is what rides
/// inside that signal's payload.
#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize, Deserialize)]
pub enum EnforcementError {
    #[error("entity {entity} is not accessible")]
    NotAccessible { entity: EntityId },

    #[error("entity {entity} is not modifiable")]
    NotModifiable { entity: EntityId },

    #[error("no correlated reply from {target} within {timeout_ms}ms after {attempts} attempt(s)")]
    AskTimeout {
        target: String,
        attempts: u32,
        timeout_ms: u64,
    },

    #[error("unexpected response: {hint}")]
    UnexpectedResponse { hint: String },

    #[error("id-resolution cache has no entry for {key}")]
    CacheInvariant { key: String },

    #[error("no enforcer cache registered for resource type {0}")]
    UnregisteredResourceType(ResourceType),

    #[error("signal {signal} carries no resolvable entity id")]
    MissingEntityId { signal: String },

    #[error("validation failed: {description}")]
    Validation { description: String },

    #[error("{0}")]
    Internal(String),
}

impl EnforcementError {
    pub fn validation(description: impl Into<String>) -> Self {
        Self::Validation {
            description: description.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
