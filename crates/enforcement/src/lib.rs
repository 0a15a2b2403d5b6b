pub mod context;
pub mod enforcer;
pub mod provider;
pub mod retriever;
pub mod task;

pub use context::{EnforcementInfra, EnforcementTimer, RequestContext};
pub use enforcer::{CompiledEnforcer, Enforcer, Permission, SharedEnforcer};
pub use provider::{
    enforce_safely, EnforcementProvider, EnforcementUnit, NoopPreEnforcer, PreEnforcer,
};
pub use retriever::{EnforcerCache, EnforcerRetriever};
pub use task::EnforcementTask;
