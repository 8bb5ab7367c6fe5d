//! TigerStyle: the plan base decides what runs, never when.
//!
//! Plans are the executable units of an agent. The [`PlanBase`] keeps
//! three registers: start plans, stop plans, and event plans guarded by
//! matchers. Selection ([`PlanBase::options_for`]) is read-only and cheap;
//! registration and retraction happen under the structural gate, so the
//! base itself needs no coordination beyond a plain read-write lock.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use selkie_core::{AgentId, Event, Params, Result, RoleId};

use crate::mailbox::Mailbox;
use selkie_container::ServiceScope;

// ============================================================================
// Plan
// ============================================================================

/// One executable unit of agent behaviour.
#[async_trait]
pub trait Plan: Send + Sync {
    fn name(&self) -> &str;

    /// Run the plan. Errors are isolated by the caller: they fail this
    /// plan, not the agent.
    async fn execute(&self, ctx: &PlanContext, params: Option<&Params>) -> Result<()>;
}

/// Body signature for closure-backed plans.
pub type PlanFn = dyn for<'a> Fn(&'a PlanContext, Option<&'a Params>) -> BoxFuture<'a, Result<()>>
    + Send
    + Sync;

/// Plan backed by an async closure, for behaviours too small to deserve
/// their own type.
pub struct FnPlan {
    name: String,
    body: Box<PlanFn>,
}

impl FnPlan {
    pub fn new<F>(name: impl Into<String>, body: F) -> Arc<Self>
    where
        F: for<'a> Fn(&'a PlanContext, Option<&'a Params>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            body: Box::new(body),
        })
    }
}

#[async_trait]
impl Plan for FnPlan {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &PlanContext, params: Option<&Params>) -> Result<()> {
        (self.body)(ctx, params).await
    }
}

// ============================================================================
// Matchers
// ============================================================================

/// Guard deciding whether an event plan applies to an event.
///
/// Returning `Some` yields the parameters the plan runs with; `None`
/// skips the plan. Matchers must not block and must not call back into
/// the owning agent's structural surface.
pub trait EventMatcher: Send + Sync {
    fn bind(&self, event: &Event) -> Option<Params>;
}

/// Matches events whose payload is exactly `T`.
pub struct TypeMatcher<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypeMatcher<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            _marker: PhantomData,
        })
    }
}

impl<T: Send + Sync + 'static> EventMatcher for TypeMatcher<T> {
    fn bind(&self, event: &Event) -> Option<Params> {
        event.is::<T>().then(Params::new)
    }
}

/// Matcher backed by a closure.
pub struct FnMatcher {
    body: Box<dyn Fn(&Event) -> Option<Params> + Send + Sync>,
}

impl FnMatcher {
    pub fn new<F>(body: F) -> Arc<Self>
    where
        F: Fn(&Event) -> Option<Params> + Send + Sync + 'static,
    {
        Arc::new(Self {
            body: Box::new(body),
        })
    }
}

impl EventMatcher for FnMatcher {
    fn bind(&self, event: &Event) -> Option<Params> {
        (self.body)(event)
    }
}

// ============================================================================
// Plan base
// ============================================================================

/// A matched plan together with the parameters its matcher produced.
pub struct PlanOption {
    pub plan: Arc<dyn Plan>,
    pub params: Params,
}

struct PlanEntry {
    plan: Arc<dyn Plan>,
    owner: Option<RoleId>,
}

struct EventPlanEntry {
    matcher: Arc<dyn EventMatcher>,
    plan: Arc<dyn Plan>,
    owner: Option<RoleId>,
}

#[derive(Default)]
struct PlanStore {
    start: Vec<PlanEntry>,
    stop: Vec<PlanEntry>,
    event: Vec<EventPlanEntry>,
}

/// Registry of an agent's start, stop and event plans.
///
/// Entries carry the role that contributed them so retracting a role
/// removes exactly its plans. Directly registered plans have no owner
/// and survive role removal. Registration order is preserved and is the
/// execution order within each register.
pub struct PlanBase {
    inner: RwLock<PlanStore>,
}

impl PlanBase {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PlanStore::default()),
        }
    }

    pub fn add_start_plan(&self, plan: Arc<dyn Plan>, owner: Option<RoleId>) {
        self.inner
            .write()
            .unwrap()
            .start
            .push(PlanEntry { plan, owner });
    }

    pub fn add_stop_plan(&self, plan: Arc<dyn Plan>, owner: Option<RoleId>) {
        self.inner
            .write()
            .unwrap()
            .stop
            .push(PlanEntry { plan, owner });
    }

    pub fn add_event_plan(
        &self,
        matcher: Arc<dyn EventMatcher>,
        plan: Arc<dyn Plan>,
        owner: Option<RoleId>,
    ) {
        self.inner.write().unwrap().event.push(EventPlanEntry {
            matcher,
            plan,
            owner,
        });
    }

    /// Remove every plan contributed by `owner`.
    pub fn retract_owner(&self, owner: RoleId) {
        let mut store = self.inner.write().unwrap();
        store.start.retain(|entry| entry.owner != Some(owner));
        store.stop.retain(|entry| entry.owner != Some(owner));
        store.event.retain(|entry| entry.owner != Some(owner));
    }

    /// Start plans in registration order.
    pub fn start_plans(&self) -> Vec<Arc<dyn Plan>> {
        self.inner
            .read()
            .unwrap()
            .start
            .iter()
            .map(|entry| entry.plan.clone())
            .collect()
    }

    /// Stop plans in registration order.
    pub fn stop_plans(&self) -> Vec<Arc<dyn Plan>> {
        self.inner
            .read()
            .unwrap()
            .stop
            .iter()
            .map(|entry| entry.plan.clone())
            .collect()
    }

    /// Every event plan whose matcher accepts `event`, with the bound
    /// parameters, in registration order.
    ///
    /// Matchers run outside the register lock so a slow matcher cannot
    /// stall concurrent registration.
    pub fn options_for(&self, event: &Event) -> Vec<PlanOption> {
        let entries: Vec<(Arc<dyn EventMatcher>, Arc<dyn Plan>)> = {
            let store = self.inner.read().unwrap();
            store
                .event
                .iter()
                .map(|entry| (entry.matcher.clone(), entry.plan.clone()))
                .collect()
        };

        entries
            .into_iter()
            .filter_map(|(matcher, plan)| {
                matcher.bind(event).map(|params| PlanOption { plan, params })
            })
            .collect()
    }

    pub fn start_count(&self) -> usize {
        self.inner.read().unwrap().start.len()
    }

    pub fn stop_count(&self) -> usize {
        self.inner.read().unwrap().stop.len()
    }

    pub fn event_count(&self) -> usize {
        self.inner.read().unwrap().event.len()
    }
}

impl Default for PlanBase {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Plan context
// ============================================================================

/// What a running plan sees of its agent.
#[derive(Clone)]
pub struct PlanContext {
    agent_id: AgentId,
    scope: Arc<ServiceScope>,
    mailbox: Arc<Mailbox>,
}

impl PlanContext {
    pub(crate) fn new(agent_id: AgentId, scope: Arc<ServiceScope>, mailbox: Arc<Mailbox>) -> Self {
        Self {
            agent_id,
            scope,
            mailbox,
        }
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// The agent's own service scope. Resolution walks up to the host.
    pub fn scope(&self) -> &Arc<ServiceScope> {
        &self.scope
    }

    /// Post an event to the agent's own mailbox.
    ///
    /// The event is handled in a later cycle, after the current plan and
    /// its siblings finish.
    pub fn post(&self, event: Event) {
        self.mailbox.offer(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (PlanContext, Arc<Mailbox>) {
        let mailbox = Arc::new(Mailbox::new(64));
        let scope = Arc::new(ServiceScope::new());
        (
            PlanContext::new(AgentId::random(), scope, mailbox.clone()),
            mailbox,
        )
    }

    #[tokio::test]
    async fn test_fn_plan_runs_and_can_post() {
        let (ctx, mailbox) = context();
        let plan = FnPlan::new("poster", |ctx, _params| {
            Box::pin(async move {
                ctx.post(Event::new(42u32));
                Ok(())
            })
        });

        plan.execute(&ctx, None).await.unwrap();
        assert_eq!(mailbox.len(), 1);
        assert!(mailbox.poll().unwrap().is::<u32>());
    }

    #[test]
    fn test_type_matcher_binds_only_its_payload_type() {
        let matcher = TypeMatcher::<u32>::new();
        assert!(matcher.bind(&Event::new(7u32)).is_some());
        assert!(matcher.bind(&Event::new("seven")).is_none());
    }

    #[test]
    fn test_fn_matcher_controls_binding() {
        let matcher = FnMatcher::new(|event| {
            event
                .downcast_ref::<u32>()
                .filter(|n| **n > 10)
                .map(|_| Params::new())
        });
        assert!(matcher.bind(&Event::new(11u32)).is_some());
        assert!(matcher.bind(&Event::new(9u32)).is_none());
    }

    fn noop<'a>(_ctx: &'a PlanContext, _params: Option<&'a Params>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_options_follow_registration_order() {
        let base = PlanBase::new();
        base.add_event_plan(TypeMatcher::<u32>::new(), FnPlan::new("first", noop), None);
        base.add_event_plan(TypeMatcher::<u32>::new(), FnPlan::new("second", noop), None);
        base.add_event_plan(TypeMatcher::<String>::new(), FnPlan::new("other", noop), None);

        let options = base.options_for(&Event::new(5u32));
        let names: Vec<&str> = options.iter().map(|o| o.plan.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_retract_owner_removes_only_that_owners_plans() {
        let base = PlanBase::new();
        let mine = RoleId::random();
        let theirs = RoleId::random();

        base.add_start_plan(FnPlan::new("mine-start", noop), Some(mine));
        base.add_start_plan(FnPlan::new("theirs-start", noop), Some(theirs));
        base.add_stop_plan(FnPlan::new("mine-stop", noop), Some(mine));
        base.add_event_plan(TypeMatcher::<u32>::new(), FnPlan::new("direct", noop), None);
        base.add_event_plan(
            TypeMatcher::<u32>::new(),
            FnPlan::new("mine-event", noop),
            Some(mine),
        );

        base.retract_owner(mine);

        assert_eq!(base.start_count(), 1);
        assert_eq!(base.stop_count(), 0);
        assert_eq!(base.event_count(), 1);
        let survivors: Vec<String> = base
            .start_plans()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(survivors, vec!["theirs-start"]);
    }

    #[test]
    fn test_no_match_yields_no_options() {
        let base = PlanBase::new();
        assert!(base.options_for(&Event::new(1u8)).is_empty());
    }
}
