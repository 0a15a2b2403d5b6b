use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use twinguard_core_types::{EnforcementError, Recipient, Signal};
use twinguard_enforcement::{
    EnforcementInfra, EnforcementProvider, EnforcementTask, PreEnforcer, RequestContext,
};

use crate::runtime::EnforcementScheduler;

/// Front-end facade: one trait object between the transport layers and the
/// enforcement pipeline.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Routes an inbound signal into enforcement. Returns false when no
    /// provider claims the signal and it is dropped.
    async fn submit(&self, signal: Signal, sender: Recipient) -> Result<bool, EnforcementError>;
}

pub struct EnforcementGateway {
    providers: Vec<Arc<dyn EnforcementProvider>>,
    pre_enforcer: Arc<dyn PreEnforcer>,
    scheduler: Arc<EnforcementScheduler>,
    infra: Arc<EnforcementInfra>,
}

impl EnforcementGateway {
    pub fn new(
        pre_enforcer: Arc<dyn PreEnforcer>,
        scheduler: Arc<EnforcementScheduler>,
        infra: Arc<EnforcementInfra>,
    ) -> Self {
        Self {
            providers: Vec::new(),
            pre_enforcer,
            scheduler,
            infra,
        }
    }

    pub fn register(mut self, provider: Arc<dyn EnforcementProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn scheduler(&self) -> &Arc<EnforcementScheduler> {
        &self.scheduler
    }
}

#[async_trait]
impl Gateway for EnforcementGateway {
    async fn submit(&self, signal: Signal, sender: Recipient) -> Result<bool, EnforcementError> {
        let provider = match self
            .providers
            .iter()
            .find(|provider| provider.is_applicable(&signal))
        {
            Some(provider) => Arc::clone(provider),
            None => {
                debug!(target: "scheduler", signal = %signal.name, "no provider claimed the signal");
                return Ok(false);
            }
        };

        let ctx = RequestContext::new(signal, sender, Arc::clone(&self.infra))?;
        match EnforcementTask::build(provider, Arc::clone(&self.pre_enforcer), ctx) {
            Some(task) => {
                let _completion = self.scheduler.schedule(task);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl<G> Gateway for Arc<G>
where
    G: Gateway + ?Sized,
{
    async fn submit(&self, signal: Signal, sender: Recipient) -> Result<bool, EnforcementError> {
        (**self).submit(signal, sender).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use twinguard_cache::{
        CacheConfig, CacheEntry, CacheError, CacheInvalidator, CacheLoader, IdResolutionCache,
        InvalidationEvent, InvalidationTarget, TtlCache,
    };
    use twinguard_core_types::{
        AuthorizationContext, EnforcerKey, EntityId, ResourceType, SignalHeaders, SignalKind,
    };
    use twinguard_enforcement::{
        CompiledEnforcer, EnforcementUnit, EnforcerRetriever, NoopPreEnforcer, Permission,
        SharedEnforcer,
    };
    use twinguard_event_bus::{InMemoryBus, InMemorySignalPublisher};

    /// Authoritative policy store the enforcer cache loads from.
    struct PolicyStore {
        readers: StdMutex<HashSet<String>>,
    }

    struct PolicyLoader {
        store: Arc<PolicyStore>,
    }

    #[async_trait]
    impl CacheLoader<EnforcerKey, SharedEnforcer> for PolicyLoader {
        async fn load(&self, _key: &EnforcerKey) -> Result<CacheEntry<SharedEnforcer>, CacheError> {
            let mut enforcer = CompiledEnforcer::new();
            for subject in self.store.readers.lock().unwrap().iter() {
                enforcer = enforcer.grant_read(subject.clone());
            }
            Ok(CacheEntry::exists(enforcer.shared()))
        }
    }

    /// Things are governed by the policy with the matching suffix.
    struct GoverningIdCache;

    #[async_trait]
    impl IdResolutionCache for GoverningIdCache {
        async fn get(
            &self,
            key: &EnforcerKey,
        ) -> Result<Option<CacheEntry<EnforcerKey>>, CacheError> {
            let policy_id = EntityId::of(key.id.as_str().replace("t-", "p-"));
            Ok(Some(CacheEntry::exists(EnforcerKey::policy(policy_id))))
        }

        fn invalidate(&self, _key: &EnforcerKey) -> bool {
            false
        }
    }

    struct RetrieveThingProvider;

    struct RetrieveThingUnit {
        ctx: RequestContext,
    }

    #[async_trait]
    impl EnforcementUnit for RetrieveThingUnit {
        fn context(&self) -> &RequestContext {
            &self.ctx
        }

        async fn enforce(&self) -> Result<RequestContext, EnforcementError> {
            let ctx = self.ctx.clone();
            let key = ctx.entity_key().expect("retrieve carries an entity").clone();
            let (_id_entry, enforcer_entry) = ctx.infra().retriever.retrieve(&key).await?;
            let auth = &ctx.signal().expect("signal present").headers.auth_context;

            let allowed = enforcer_entry
                .value()
                .map(|enforcer| enforcer.has_permission(auth, Permission::Read))
                .unwrap_or(false);
            if !allowed {
                return Err(EnforcementError::NotAccessible {
                    entity: key.id.clone(),
                });
            }

            let headers = ctx.signal().expect("signal present").headers.clone();
            let response = Signal::response(
                "things.responses:retrieveThing",
                Some(key),
                headers,
                serde_json::json!({"attributes": {}}),
            );
            Ok(ctx.with_signal(response)?.reply_to_sender())
        }
    }

    impl EnforcementProvider for RetrieveThingProvider {
        fn name(&self) -> &'static str {
            "retrieve-thing"
        }

        fn is_applicable(&self, signal: &Signal) -> bool {
            signal.name == "things.queries:retrieveThing"
        }

        fn changes_authorization(&self, _signal: &Signal) -> bool {
            false
        }

        fn create_enforcement(&self, ctx: RequestContext) -> Box<dyn EnforcementUnit> {
            Box::new(RetrieveThingUnit { ctx })
        }
    }

    struct ModifyPolicyProvider {
        store: Arc<PolicyStore>,
        grant: String,
    }

    struct ModifyPolicyUnit {
        ctx: RequestContext,
        store: Arc<PolicyStore>,
        grant: String,
    }

    #[async_trait]
    impl EnforcementUnit for ModifyPolicyUnit {
        fn context(&self) -> &RequestContext {
            &self.ctx
        }

        async fn enforce(&self) -> Result<RequestContext, EnforcementError> {
            let ctx = self.ctx.clone();
            let key = ctx.entity_key().expect("modify carries an entity").clone();

            // The authorization-changing write, then the paired local +
            // broadcast invalidation.
            self.store.readers.lock().unwrap().insert(self.grant.clone());
            ctx.infra().invalidator.invalidate(&key).await.map_err(EnforcementError::from)?;
            Ok(ctx.drop_response())
        }
    }

    impl EnforcementProvider for ModifyPolicyProvider {
        fn name(&self) -> &'static str {
            "modify-policy"
        }

        fn is_applicable(&self, signal: &Signal) -> bool {
            signal.name == "policies.commands:modifyPolicy"
        }

        fn changes_authorization(&self, _signal: &Signal) -> bool {
            true
        }

        fn create_enforcement(&self, ctx: RequestContext) -> Box<dyn EnforcementUnit> {
            Box::new(ModifyPolicyUnit {
                ctx,
                store: Arc::clone(&self.store),
                grant: self.grant.clone(),
            })
        }
    }

    struct Fixture {
        gateway: EnforcementGateway,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(PolicyStore {
            readers: StdMutex::new(HashSet::new()),
        });
        let enforcer_cache: Arc<TtlCache<EnforcerKey, SharedEnforcer>> = Arc::new(TtlCache::new(
            "enforcer-policy",
            CacheConfig::default(),
            Arc::new(PolicyLoader {
                store: Arc::clone(&store),
            }) as Arc<dyn CacheLoader<EnforcerKey, SharedEnforcer>>,
        ));

        let bus: Arc<InMemoryBus<InvalidationEvent>> = InMemoryBus::new(16);
        let invalidator = Arc::new(
            CacheInvalidator::new(bus)
                .register(Arc::clone(&enforcer_cache) as Arc<dyn InvalidationTarget>),
        );
        let retriever = Arc::new(
            EnforcerRetriever::new(Arc::new(GoverningIdCache))
                .register(ResourceType::Policy, enforcer_cache),
        );
        let publisher = InMemorySignalPublisher::new(InMemoryBus::new(16));
        let infra = EnforcementInfra::new(retriever, invalidator, publisher);

        let gateway = EnforcementGateway::new(
            Arc::new(NoopPreEnforcer),
            EnforcementScheduler::new(),
            infra,
        )
        .register(Arc::new(RetrieveThingProvider))
        .register(Arc::new(ModifyPolicyProvider {
            store,
            grant: "subject:alice".to_string(),
        }));

        Fixture { gateway }
    }

    fn retrieve_thing_as(subject: &str) -> Signal {
        let mut headers = SignalHeaders::default();
        headers.auth_context = AuthorizationContext::new([subject]);
        Signal::query(
            "things.queries:retrieveThing",
            EnforcerKey::thing(EntityId::of("t-1")),
            headers,
        )
    }

    async fn await_reply(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<twinguard_core_types::Envelope>,
    ) -> Signal {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("reply within deadline")
            .expect("mailbox open")
            .signal
    }

    #[tokio::test]
    async fn unclaimed_signals_are_reported_not_scheduled() {
        let fixture = fixture();
        let (sender, _rx) = Recipient::new("client");
        let stray = Signal::command(
            "things.commands:unknown",
            EnforcerKey::thing(EntityId::of("t-1")),
            SignalHeaders::default(),
        );
        assert!(!fixture.gateway.submit(stray, sender).await.unwrap());
    }

    #[tokio::test]
    async fn denied_retrieve_yields_a_typed_error() {
        let fixture = fixture();
        let (sender, mut rx) = Recipient::new("client");

        assert!(fixture
            .gateway
            .submit(retrieve_thing_as("subject:alice"), sender)
            .await
            .unwrap());

        let reply = await_reply(&mut rx).await;
        assert_eq!(reply.kind, SignalKind::Error);
        assert!(matches!(
            reply.embedded_error(),
            Some(EnforcementError::NotAccessible { .. })
        ));
    }

    #[tokio::test]
    async fn retrieve_after_policy_change_sees_the_new_enforcer() {
        let fixture = fixture();
        let (client, mut client_rx) = Recipient::new("client");

        // Denied before the grant; this also populates the enforcer cache.
        fixture
            .gateway
            .submit(retrieve_thing_as("subject:alice"), client.clone())
            .await
            .unwrap();
        let first = await_reply(&mut client_rx).await;
        assert_eq!(first.kind, SignalKind::Error);

        // ModifyPolicy on the governing policy grants the read and
        // invalidates the cached enforcer.
        let modify = Signal::command(
            "policies.commands:modifyPolicy",
            EnforcerKey::policy(EntityId::of("p-1")),
            SignalHeaders::default(),
        );
        fixture.gateway.submit(modify, client.clone()).await.unwrap();

        // Wait until the authorization change has fully completed.
        let scheduler = fixture.gateway.scheduler().clone();
        for _ in 0..100 {
            if scheduler.is_idle(&EntityId::of("p-1")) && scheduler.active_entities() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        fixture
            .gateway
            .submit(retrieve_thing_as("subject:alice"), client)
            .await
            .unwrap();
        let second = await_reply(&mut client_rx).await;
        assert_eq!(second.kind, SignalKind::Response);
        assert_eq!(second.name, "things.responses:retrieveThing");
    }
}
