pub mod api;
pub mod metrics;
pub mod runtime;

pub use api::{EnforcementGateway, Gateway};
pub use runtime::{EnforcementScheduler, TaskCompletion};
