use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthorizationContext;
use crate::error::EnforcementError;
use crate::ids::{CorrelationId, EnforcerKey};

/// Routing channel of a signal: to the authoritative twin store, or live to a
/// connected client with out-of-band response correlation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Channel {
    Twin,
    Live,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SignalKind {
    Command,
    Query,
    Event,
    Response,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignalHeaders {
    pub correlation_id: CorrelationId,
    pub response_required: bool,
    pub timeout: Option<Duration>,
    pub channel: Channel,
    pub auth_context: AuthorizationContext,
}

impl Default for SignalHeaders {
    fn default() -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            response_required: true,
            timeout: None,
            channel: Channel::Twin,
            auth_context: AuthorizationContext::default(),
        }
    }
}

/// An addressable signal with headers: the unit everything in the enforcement
/// pipeline carries around.
///
/// Every signal that reaches enforcement names the entity it targets; only
/// error signals legitimately carry no entity key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub kind: SignalKind,
    pub entity: Option<EnforcerKey>,
    pub headers: SignalHeaders,
    pub payload: Value,
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        kind: SignalKind,
        entity: Option<EnforcerKey>,
        headers: SignalHeaders,
        payload: Value,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            entity,
            headers,
            payload,
        }
    }

    pub fn command(name: impl Into<String>, entity: EnforcerKey, headers: SignalHeaders) -> Self {
        Self::new(name, SignalKind::Command, Some(entity), headers, Value::Null)
    }

    pub fn query(name: impl Into<String>, entity: EnforcerKey, headers: SignalHeaders) -> Self {
        Self::new(name, SignalKind::Query, Some(entity), headers, Value::Null)
    }

    pub fn response(
        name: impl Into<String>,
        entity: Option<EnforcerKey>,
        headers: SignalHeaders,
        payload: Value,
    ) -> Self {
        Self::new(name, SignalKind::Response, entity, headers, payload)
    }

    /// Wraps a domain error into the typed error-response signal addressed
    /// back against the given correlation metadata.
    pub fn error_response(error: &EnforcementError, headers: SignalHeaders) -> Self {
        let payload = serde_json::to_value(error).unwrap_or(Value::Null);
        Self::new("enforcement.error", SignalKind::Error, None, headers, payload)
    }

    /// The domain error embedded in a typed error-response signal, if any.
    pub fn embedded_error(&self) -> Option<EnforcementError> {
        if self.kind != SignalKind::Error {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn entity_key(&self) -> Option<&EnforcerKey> {
        self.entity.as_ref()
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.headers.correlation_id
    }

    pub fn is_response_required(&self) -> bool {
        self.headers.response_required
    }
}
