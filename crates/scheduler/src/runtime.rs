use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use twinguard_core_types::EntityId;
use twinguard_enforcement::{EnforcementTask, RequestContext};

use crate::metrics;

/// Completes once a scheduled task has run and its result has been handed to
/// dispatch. Cheap to clone and to drop unobserved.
pub type TaskCompletion = Shared<BoxFuture<'static, ()>>;

fn completed() -> TaskCompletion {
    futures::future::ready(()).boxed().shared()
}

/// Per-entity chain pair: `auth_chain` is the barrier every later task waits
/// on, `work_chain` additionally joins the non-authorization tasks scheduled
/// since that barrier. `work_chain` always depends transitively on the
/// latest `auth_chain`.
struct EntityState {
    auth_chain: TaskCompletion,
    work_chain: TaskCompletion,
    ref_count: usize,
}

impl EntityState {
    fn idle() -> Self {
        let done = completed();
        Self {
            auth_chain: done.clone(),
            work_chain: done,
            ref_count: 0,
        }
    }
}

/// The ordering engine: unrelated entities proceed fully in parallel, while
/// per entity every authorization-changing task acts as a fence — it starts
/// only after everything scheduled before it has finished, and nothing
/// scheduled after it starts before it completes.
///
/// The state map is the only single-writer resource; its mutex guards the
/// map-update-and-chain-compute step only and is never held across an await.
pub struct EnforcementScheduler {
    entities: Mutex<HashMap<EntityId, EntityState>>,
}

impl EnforcementScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entities: Mutex::new(HashMap::new()),
        })
    }

    /// Schedules `task` after the correct predecessors on its entity and
    /// dispatches the resulting context once the task body completes. Once
    /// queued, the deferred computation always runs to completion; there is
    /// no cancellation, which the refcount bookkeeping depends on.
    pub fn schedule(self: &Arc<Self>, task: EnforcementTask) -> TaskCompletion {
        let entity = task.entity().clone();
        let changes_authorization = task.changes_authorization();
        let (notify_tx, notify_rx) = oneshot::channel::<()>();
        let completion: TaskCompletion = notify_rx.map(|_| ()).boxed().shared();

        let (barrier, prior_work) = {
            let mut entities = self.entities.lock();
            let state = entities
                .entry(entity.clone())
                .or_insert_with(EntityState::idle);
            let barrier = state.auth_chain.clone();
            let prior_work = state.work_chain.clone();
            if changes_authorization {
                state.auth_chain = completion.clone();
                state.work_chain = completion.clone();
            } else {
                state.work_chain = futures::future::join(state.work_chain.clone(), completion.clone())
                    .map(|_| ())
                    .boxed()
                    .shared();
            }
            state.ref_count += 1;
            (barrier, prior_work)
        };
        metrics::record_scheduled();
        debug!(
            target: "scheduler",
            %entity,
            changes_authorization,
            "task scheduled"
        );

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            barrier.await;
            if changes_authorization {
                // An authorization change may not start while any previously
                // scheduled task for this entity is still running.
                prior_work.await;
            }
            // The refcount release must survive a panicking task body, or
            // the entity's slot would stay in the map forever.
            let release = ReleaseOnDrop {
                scheduler,
                entity,
            };
            let ctx = task.start().await;
            release.scheduler.dispatch(ctx);
            metrics::record_completed();
            drop(release);
            let _ = notify_tx.send(());
        });
        completion
    }

    /// Entities currently holding scheduler state. Idle entities are absent.
    pub fn active_entities(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_idle(&self, entity: &EntityId) -> bool {
        !self.entities.lock().contains_key(entity)
    }

    fn release(&self, entity: &EntityId) {
        let mut entities = self.entities.lock();
        if let Some(state) = entities.get_mut(entity) {
            state.ref_count = state.ref_count.saturating_sub(1);
            if state.ref_count == 0 {
                entities.remove(entity);
                debug!(target: "scheduler", %entity, "entity idle, state removed");
            }
        }
    }

    /// Final dispatch of a completed task's context: pipe a deferred ask
    /// result, send the signal through the receiver wrapper, or drop when no
    /// receiver is set (the explicit no-response path).
    fn dispatch(&self, mut ctx: RequestContext) {
        let receiver = ctx.receiver().cloned();
        match (ctx.take_ask_future(), receiver) {
            (Some(ask_future), Some(receiver)) => {
                metrics::record_dispatched();
                // The pipe is registered before any suspension point, so it
                // cannot reorder relative to sends the task body already
                // issued on the same mailbox.
                tokio::spawn(async move {
                    let signal = ask_future.await;
                    if !receiver.tell(signal) {
                        warn!(target: "scheduler", receiver = receiver.name(), "receiver gone, ask result lost");
                    }
                });
            }
            (None, Some(receiver)) => match ctx.take_signal() {
                Some(signal) => {
                    let wrapped = ctx.wrap_for_receiver(signal);
                    metrics::record_dispatched();
                    if !receiver.tell(wrapped) {
                        warn!(target: "scheduler", receiver = receiver.name(), "receiver gone, result lost");
                    }
                }
                None => metrics::record_dropped(),
            },
            _ => {
                metrics::record_dropped();
                debug!(target: "scheduler", "no receiver, result dropped");
            }
        }
    }
}

struct ReleaseOnDrop {
    scheduler: Arc<EnforcementScheduler>,
    entity: EntityId,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.scheduler.release(&self.entity);
    }
}
