use async_trait::async_trait;
use tracing::{debug, warn};

use twinguard_core_types::{EnforcementError, Signal};

use crate::context::RequestContext;

/// Pluggable, failable transform run before authorization, e.g. to reject
/// malformed headers.
#[async_trait]
pub trait PreEnforcer: Send + Sync {
    async fn apply(&self, ctx: RequestContext) -> Result<RequestContext, EnforcementError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPreEnforcer;

#[async_trait]
impl PreEnforcer for NoopPreEnforcer {
    async fn apply(&self, ctx: RequestContext) -> Result<RequestContext, EnforcementError> {
        Ok(ctx)
    }
}

/// Per-signal-type strategy: claims a signal, states whether enforcing it may
/// change future authorization decisions, and builds the enforcement unit.
pub trait EnforcementProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_applicable(&self, signal: &Signal) -> bool;
    fn changes_authorization(&self, signal: &Signal) -> bool;
    fn create_enforcement(&self, ctx: RequestContext) -> Box<dyn EnforcementUnit>;
}

/// One enforcement run for one signal. `enforce` contains the real
/// authorization logic and may fail; [`enforce_safely`] is the boundary that
/// never does.
#[async_trait]
pub trait EnforcementUnit: Send + Sync {
    fn context(&self) -> &RequestContext;
    async fn enforce(&self) -> Result<RequestContext, EnforcementError>;
}

/// Runs the unit and converts any failure into an error response addressed
/// back to the original sender. The request timer is closed in either
/// outcome; the returned future never fails.
pub async fn enforce_safely(unit: &dyn EnforcementUnit) -> RequestContext {
    let timer = unit.context().timer();
    match unit.enforce().await {
        Ok(ctx) => {
            debug!(
                target: "enforcement",
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "enforcement completed"
            );
            ctx
        }
        Err(error) => {
            warn!(
                target: "enforcement",
                %error,
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "enforcement failed, answering the original sender"
            );
            unit.context().clone().into_error_response(&error)
        }
    }
}
