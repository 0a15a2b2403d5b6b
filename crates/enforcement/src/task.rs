use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::warn;

use twinguard_core_types::EntityId;

use crate::context::RequestContext;
use crate::provider::{enforce_safely, EnforcementProvider, PreEnforcer};

type TaskBody = Box<dyn FnOnce() -> BoxFuture<'static, RequestContext> + Send>;

/// A deferred, asynchronous unit of enforcement work, tagged with the entity
/// it targets and whether it changes authorization. Consumed exactly once by
/// the scheduler; retries happen inside the deferred computation.
pub struct EnforcementTask {
    entity: EntityId,
    changes_authorization: bool,
    run: TaskBody,
}

impl EnforcementTask {
    pub fn new<F, Fut>(entity: EntityId, changes_authorization: bool, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = RequestContext> + Send + 'static,
    {
        Self {
            entity,
            changes_authorization,
            run: Box::new(move || run().boxed()),
        }
    }

    /// Builds the task for a claimed context: pre-enforcement hook first,
    /// then the provider's enforcement behind the `enforce_safely` boundary.
    ///
    /// A signal without a resolvable entity id is logged and dropped; no
    /// signal type that reaches this stage should carry none.
    pub fn build(
        provider: Arc<dyn EnforcementProvider>,
        pre_enforcer: Arc<dyn PreEnforcer>,
        ctx: RequestContext,
    ) -> Option<Self> {
        let signal = ctx.signal()?;
        let Some(key) = ctx.entity_key() else {
            warn!(
                target: "enforcement",
                signal = %signal.name,
                provider = provider.name(),
                "signal reached enforcement without an entity id, dropping"
            );
            return None;
        };
        let entity = key.id.clone();
        let changes_authorization = provider.changes_authorization(signal);

        Some(Self::new(entity, changes_authorization, move || async move {
            let fallback = ctx.clone();
            let ctx = match pre_enforcer.apply(ctx).await {
                Ok(ctx) => ctx,
                Err(error) => {
                    warn!(target: "enforcement", %error, "pre-enforcement rejected the signal");
                    return fallback.into_error_response(&error);
                }
            };
            let unit = provider.create_enforcement(ctx);
            enforce_safely(unit.as_ref()).await
        }))
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn changes_authorization(&self) -> bool {
        self.changes_authorization
    }

    /// Starts the deferred computation. The returned future never fails.
    pub fn start(self) -> BoxFuture<'static, RequestContext> {
        (self.run)()
    }
}

impl fmt::Debug for EnforcementTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementTask")
            .field("entity", &self.entity)
            .field("changes_authorization", &self.changes_authorization)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support;
    use crate::provider::{EnforcementUnit, NoopPreEnforcer};
    use async_trait::async_trait;
    use twinguard_core_types::{
        EnforcementError, EnforcerKey, EntityId, Recipient, Signal, SignalHeaders, SignalKind,
    };

    struct PassThroughProvider;

    struct PassThroughUnit {
        ctx: RequestContext,
    }

    #[async_trait]
    impl EnforcementUnit for PassThroughUnit {
        fn context(&self) -> &RequestContext {
            &self.ctx
        }

        async fn enforce(&self) -> Result<RequestContext, EnforcementError> {
            Ok(self.ctx.clone().reply_to_sender())
        }
    }

    impl EnforcementProvider for PassThroughProvider {
        fn name(&self) -> &'static str {
            "pass-through"
        }

        fn is_applicable(&self, signal: &Signal) -> bool {
            signal.kind == SignalKind::Query
        }

        fn changes_authorization(&self, signal: &Signal) -> bool {
            signal.name.contains("modifyPolicy")
        }

        fn create_enforcement(&self, ctx: RequestContext) -> Box<dyn EnforcementUnit> {
            Box::new(PassThroughUnit { ctx })
        }
    }

    struct RejectingPreEnforcer;

    #[async_trait]
    impl PreEnforcer for RejectingPreEnforcer {
        async fn apply(&self, _ctx: RequestContext) -> Result<RequestContext, EnforcementError> {
            Err(EnforcementError::validation("malformed headers"))
        }
    }

    fn query_ctx(sender: Recipient) -> RequestContext {
        let signal = Signal::query(
            "things.queries:retrieveThing",
            EnforcerKey::thing(EntityId::of("t-1")),
            SignalHeaders::default(),
        );
        RequestContext::new(signal, sender, test_support::infra()).unwrap()
    }

    #[tokio::test]
    async fn build_tags_the_task_with_entity_and_authorization_flag() {
        let (sender, _rx) = Recipient::new("client");
        let task = EnforcementTask::build(
            Arc::new(PassThroughProvider),
            Arc::new(NoopPreEnforcer),
            query_ctx(sender),
        )
        .unwrap();

        assert_eq!(task.entity(), &EntityId::of("t-1"));
        assert!(!task.changes_authorization());

        let result = task.start().await;
        assert!(result.receiver().is_some());
    }

    #[tokio::test]
    async fn error_signal_without_entity_id_is_dropped() {
        let (sender, _rx) = Recipient::new("client");
        let error_signal = Signal::error_response(
            &EnforcementError::validation("boom"),
            SignalHeaders::default(),
        );
        let ctx = RequestContext::new(error_signal, sender, test_support::infra()).unwrap();

        let task = EnforcementTask::build(
            Arc::new(PassThroughProvider),
            Arc::new(NoopPreEnforcer),
            ctx,
        );
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn pre_enforcement_rejection_answers_the_sender() {
        let (sender, mut rx) = Recipient::new("client");
        let task = EnforcementTask::build(
            Arc::new(PassThroughProvider),
            Arc::new(RejectingPreEnforcer),
            query_ctx(sender),
        )
        .unwrap();

        let mut result = task.start().await;
        let signal = result.take_signal().unwrap();
        result.receiver().unwrap().tell(signal);

        let delivered = rx.recv().await.unwrap();
        assert!(matches!(
            delivered.signal.embedded_error(),
            Some(EnforcementError::Validation { .. })
        ));
    }
}
