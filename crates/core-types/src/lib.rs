pub mod address;
pub mod auth;
pub mod error;
pub mod ids;
pub mod signal;

pub use address::{Envelope, Recipient};
pub use auth::AuthorizationContext;
pub use error::EnforcementError;
pub use ids::{CorrelationId, EntityId, EnforcerKey, ResourceType};
pub use signal::{Channel, Signal, SignalHeaders, SignalKind};
