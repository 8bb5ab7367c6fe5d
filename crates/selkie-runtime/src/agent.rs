//! TigerStyle: one agent, one task chain, one permit.
//!
//! [`Agent`] is the kernel façade: lifecycle, structure, services and
//! messaging behind one cloneable handle. The handle wraps an
//! [`AgentCore`] that ties together the state cell, the structural gate,
//! the mailbox, and the plan and role bases. The run loop itself lives
//! in the scheduler module as a chain of resubmitting tasks over the
//! same core.
//!
//! Concurrency contract, in one place:
//!
//! - The state cell decides every lifecycle race; exactly one caller
//!   wins each transition.
//! - The structural gate serializes role and plan mutation against the
//!   run. Starting parks the permit in the core; the stop task releases
//!   it after settling idle, so a blocked structural caller resumes to
//!   an idle agent.
//! - The mailbox wakes the core on every offer; the core resumes the
//!   chain only when it wins the WAITING to ACTIVE flip.

use std::any::Any;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use selkie_container::{ServiceHook, ServiceScope};
use selkie_core::{
    AgentConfig, AgentId, Error, Event, LifecycleState, Message, Result, RoleId, Spawner,
    StateCell, TokioSpawner,
};
use selkie_registry::{AgentDirectory, Deliver, LocalAddress};
use tracing::{debug, info, instrument, warn};

use crate::gate::{RunPermit, StructuralGate};
use crate::mailbox::{Mailbox, MailboxWake};
use crate::plan::{EventMatcher, Plan, PlanBase, PlanContext};
use crate::role::{RoleBase, RoleInfo, RoleSource};

// ============================================================================
// Core
// ============================================================================

/// Shared innards of one agent. The façade and every task of the run
/// chain hold this behind an `Arc`.
pub(crate) struct AgentCore {
    pub(crate) id: AgentId,
    pub(crate) config: AgentConfig,
    pub(crate) state: StateCell,
    pub(crate) gate: StructuralGate,
    /// Parked for the duration of a run; taken by the stop task.
    pub(crate) run_permit: Mutex<Option<RunPermit>>,
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) plans: PlanBase,
    pub(crate) roles: RoleBase,
    pub(crate) scope: Arc<ServiceScope>,
    pub(crate) ctx: PlanContext,
    spawner_override: Option<Arc<dyn Spawner>>,
    spawner: RwLock<Option<Arc<dyn Spawner>>>,
    directory: RwLock<Option<Arc<dyn AgentDirectory>>>,
}

impl AgentCore {
    fn new(config: AgentConfig, spawner_override: Option<Arc<dyn Spawner>>) -> Arc<Self> {
        let id = AgentId::random();
        let scope = Arc::new(ServiceScope::new());
        let mailbox = Arc::new(Mailbox::new(config.mailbox_depth_warn));

        let core = Arc::new(Self {
            id,
            config,
            state: StateCell::new(),
            gate: StructuralGate::new(),
            run_permit: Mutex::new(None),
            mailbox: mailbox.clone(),
            plans: PlanBase::new(),
            roles: RoleBase::new(id),
            scope: scope.clone(),
            ctx: PlanContext::new(id, scope.clone(), mailbox.clone()),
            spawner_override,
            spawner: RwLock::new(None),
            directory: RwLock::new(None),
        });

        let waker: Weak<AgentCore> = Arc::downgrade(&core);
        mailbox.bind_waker(waker);

        // Seed the agent's own scope with identity and address so plans
        // and role constructors can reach them through the chain.
        scope.put(id);
        let target: Weak<AgentCore> = Arc::downgrade(&core);
        scope.put(LocalAddress::new(id, target));

        core
    }

    pub(crate) fn spawner(&self) -> Option<Arc<dyn Spawner>> {
        self.spawner.read().unwrap().clone()
    }

    fn directory(&self) -> Option<Arc<dyn AgentDirectory>> {
        self.directory.read().unwrap().clone()
    }

    fn unbind_host(&self) {
        self.scope.clear_parent();
        *self.spawner.write().unwrap() = None;
        *self.directory.write().unwrap() = None;
    }
}

impl Deliver for AgentCore {
    fn deliver(&self, message: Message) {
        self.mailbox.offer(Event::from(message));
    }
}

impl MailboxWake for AgentCore {
    /// Wake path: resume a parked run chain. Offers landing while the
    /// agent is ACTIVE lose the flip and are drained by the in-flight
    /// chain; offers to a non-running agent wait in the mailbox.
    fn on_offer(self: Arc<Self>) {
        if self
            .state
            .transition(LifecycleState::Waiting, LifecycleState::Active)
            .is_ok()
        {
            self.submit_step();
        }
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Handle to one agent. Cloning shares the agent; the last clone (and
/// the last registered address holder) dropping it tears the core down.
#[derive(Clone)]
pub struct Agent {
    core: Arc<AgentCore>,
}

impl Agent {
    /// Agent with default tuning. Starts undeployed.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(AgentConfig::default(), None),
        }
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn id(&self) -> AgentId {
        self.core.id
    }

    pub fn state(&self) -> LifecycleState {
        self.core.state.load()
    }

    /// Whether the run chain is live. A parked agent counts as running.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// The agent's own service scope.
    pub fn scope(&self) -> &Arc<ServiceScope> {
        &self.core.scope
    }

    /// The hosting scope, while deployed.
    pub fn host_scope(&self) -> Option<Arc<ServiceScope>> {
        self.core.scope.parent()
    }

    pub fn mailbox_depth(&self) -> usize {
        self.core.mailbox.len()
    }

    /// Address peers deliver through. Does not keep the agent alive.
    pub fn address(&self) -> LocalAddress {
        let target: Weak<AgentCore> = Arc::downgrade(&self.core);
        LocalAddress::new(self.core.id, target)
    }

    // ========================================================================
    // Deployment
    // ========================================================================

    /// Deploy into a host scope.
    ///
    /// Walks UNKNOWN or IDLE through TRANSIT: links the host as scope
    /// parent, resolves the directory and spawner, runs installed
    /// service hooks in install order, publishes the agent's address,
    /// then settles IDLE. Redeploying an idle agent unwinds the previous
    /// hosting first. Any failure unlinks the host and reverts to the
    /// unhosted state, so the agent is never left in TRANSIT.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub async fn deploy(&self, host: &Arc<ServiceScope>) -> Result<()> {
        let core = &self.core;
        let prev = loop {
            let state = core.state.load();
            match state {
                LifecycleState::Unknown | LifecycleState::Idle => {
                    if core
                        .state
                        .transition(state, LifecycleState::Transit)
                        .is_ok()
                    {
                        break state;
                    }
                }
                other => return Err(Error::state_rejection(core.id, other)),
            }
        };

        if prev == LifecycleState::Idle {
            self.unwire().await;
        }

        match self.wire(host).await {
            Ok(()) => {
                core.state.store(LifecycleState::Idle);
                info!("deployed");
                Ok(())
            }
            Err(err) => {
                // Withdraw whatever wire() already published into the host.
                host.remove_named(&core.id.to_string());
                core.unbind_host();
                core.state.store(LifecycleState::Unknown);
                Err(err)
            }
        }
    }

    /// Unwind the current hosting: best-effort deregistration plus host
    /// cleanup. Used by redeploy, where the old host is being replaced
    /// anyway.
    async fn unwire(&self) {
        let core = &self.core;
        if let Some(directory) = core.directory() {
            if let Err(err) = directory.deregister(core.id).await {
                warn!(agent = %core.id, %err, "stale registration cleanup failed");
            }
        }
        if let Some(host) = core.scope.parent() {
            host.remove_named(&core.id.to_string());
        }
        core.unbind_host();
    }

    async fn wire(&self, host: &Arc<ServiceScope>) -> Result<()> {
        let core = &self.core;
        core.scope
            .set_parent(host.clone())
            .map_err(|err| Error::deployment_failed(core.id, err.to_string()))?;

        let directory = core
            .scope
            .resolve::<Arc<dyn AgentDirectory>>()
            .map_err(|_| Error::deployment_failed(core.id, "no agent directory in scope"))?;
        let spawner = core
            .spawner_override
            .clone()
            .or_else(|| core.scope.resolve::<Arc<dyn Spawner>>().ok())
            .unwrap_or_else(|| Arc::new(TokioSpawner));
        *core.spawner.write().unwrap() = Some(spawner);
        *core.directory.write().unwrap() = Some(directory.clone());

        for hook in core.scope.hooks() {
            hook.on_deploy(&core.scope).await.map_err(|err| {
                Error::deployment_failed(core.id, format!("hook {}: {err}", hook.name()))
            })?;
        }

        let address = self.address();
        host.put_named(core.id.to_string(), address.clone());
        let displaced = directory
            .register(address)
            .await
            .map_err(|err| Error::deployment_failed(core.id, err.to_string()))?;
        if displaced.is_some() {
            debug!("replaced a previous address registration");
        }
        Ok(())
    }

    /// Tear down a deployed, idle agent.
    ///
    /// Deregisters from the directory first, so the agent becomes
    /// unreachable before its wiring is undone; then runs undeploy hooks
    /// in reverse install order, unlinks the host and settles UNKNOWN.
    /// Hook failures are logged and do not abort the teardown.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub async fn undeploy(&self) -> Result<()> {
        let core = &self.core;
        core.state
            .transition(LifecycleState::Idle, LifecycleState::Transit)
            .map_err(|actual| Error::state_rejection(core.id, actual))?;

        if let Some(directory) = core.directory() {
            if let Err(err) = directory.deregister(core.id).await {
                core.state.store(LifecycleState::Idle);
                return Err(Error::undeploy_failed(core.id, err.to_string()));
            }
        }

        for hook in core.scope.hooks().iter().rev() {
            if let Err(err) = hook.on_undeploy(&core.scope).await {
                warn!(hook = hook.name(), %err, "undeploy hook failed");
            }
        }

        if let Some(host) = core.scope.parent() {
            host.remove_named(&core.id.to_string());
        }
        core.unbind_host();
        core.state.store(LifecycleState::Unknown);
        info!("undeployed");
        Ok(())
    }

    // ========================================================================
    // Run control
    // ========================================================================

    /// Start the run chain, waiting for the structural gate.
    ///
    /// Starting an agent that is mid-run blocks until the current run
    /// stops, then starts the next one.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub async fn start(&self) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.launch(permit)
    }

    /// Start only if the gate is free right now.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub fn try_start(&self) -> Result<()> {
        self.try_permit().and_then(|permit| self.launch(permit))
    }

    /// Start, waiting for the gate up to `limit`.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub async fn start_timeout(&self, limit: Duration) -> Result<()> {
        let permit = self.timed_permit(limit).await?;
        self.launch(permit)
    }

    /// Common tail of the start family: flip IDLE to ACTIVE, park the
    /// permit for the whole run, submit the start task.
    fn launch(&self, permit: RunPermit) -> Result<()> {
        let core = &self.core;
        core.state
            .transition(LifecycleState::Idle, LifecycleState::Active)
            .map_err(|actual| Error::state_rejection(core.id, actual))?;
        *core.run_permit.lock().unwrap() = Some(permit);
        info!("starting");
        core.submit_start();
        Ok(())
    }

    /// Request a cooperative stop.
    ///
    /// From ACTIVE the in-flight chain observes STOPPING after the
    /// current cycle and hands off to the stop task; from WAITING no
    /// task is in flight, so the stop task is submitted here. A running
    /// plan is never preempted.
    #[instrument(skip_all, fields(agent = %self.core.id))]
    pub fn stop(&self) -> Result<()> {
        let core = &self.core;
        loop {
            match core.state.load() {
                LifecycleState::Active => {
                    if core
                        .state
                        .transition(LifecycleState::Active, LifecycleState::Stopping)
                        .is_ok()
                    {
                        debug!("stop requested; run chain hands off");
                        return Ok(());
                    }
                }
                LifecycleState::Waiting => {
                    if core
                        .state
                        .transition(LifecycleState::Waiting, LifecycleState::Stopping)
                        .is_ok()
                    {
                        debug!("stop requested from park");
                        core.submit_stop();
                        return Ok(());
                    }
                }
                LifecycleState::Stopping => return Err(Error::already_stopping(core.id)),
                other => return Err(Error::not_running(core.id, other)),
            }
        }
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Enqueue a message. Never blocks and never fails; events offered
    /// to a non-running agent wait in the mailbox until the next start.
    pub fn notify(&self, message: Message) {
        self.core.deliver(message);
    }

    /// Enqueue a raw event.
    pub fn post(&self, event: Event) {
        self.core.mailbox.offer(event);
    }

    // ========================================================================
    // Structure: roles
    // ========================================================================

    /// Add a role, waiting for the structural gate.
    pub async fn add_role(&self, source: RoleSource) -> Result<RoleId> {
        let permit = self.core.gate.acquire().await;
        self.add_role_guarded(permit, source)
    }

    /// Add a role only if the gate is free right now.
    pub fn try_add_role(&self, source: RoleSource) -> Result<RoleId> {
        let permit = self.try_permit()?;
        self.add_role_guarded(permit, source)
    }

    /// Add a role, waiting for the gate up to `limit`.
    pub async fn add_role_timeout(&self, source: RoleSource, limit: Duration) -> Result<RoleId> {
        let permit = self.timed_permit(limit).await?;
        self.add_role_guarded(permit, source)
    }

    /// Detach a role and retract its plans, waiting for the gate.
    pub async fn remove_role(&self, role: RoleId) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| core.roles.remove(role, &core.plans))
    }

    pub fn try_remove_role(&self, role: RoleId) -> Result<()> {
        let permit = self.try_permit()?;
        self.guarded(permit, |core| core.roles.remove(role, &core.plans))
    }

    pub async fn remove_role_timeout(&self, role: RoleId, limit: Duration) -> Result<()> {
        let permit = self.timed_permit(limit).await?;
        self.guarded(permit, |core| core.roles.remove(role, &core.plans))
    }

    /// Promote an attached role, waiting for the gate. Idempotent for
    /// attached roles; fails for identities never attached.
    pub async fn activate_role(&self, role: RoleId) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| core.roles.activate(role))
    }

    pub fn try_activate_role(&self, role: RoleId) -> Result<()> {
        let permit = self.try_permit()?;
        self.guarded(permit, |core| core.roles.activate(role))
    }

    pub async fn activate_role_timeout(&self, role: RoleId, limit: Duration) -> Result<()> {
        let permit = self.timed_permit(limit).await?;
        self.guarded(permit, |core| core.roles.activate(role))
    }

    /// Detach every role, waiting for the gate.
    pub async fn clear_roles(&self) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| {
            core.roles.clear(&core.plans);
            Ok(())
        })
    }

    pub fn try_clear_roles(&self) -> Result<()> {
        let permit = self.try_permit()?;
        self.guarded(permit, |core| {
            core.roles.clear(&core.plans);
            Ok(())
        })
    }

    pub async fn clear_roles_timeout(&self, limit: Duration) -> Result<()> {
        let permit = self.timed_permit(limit).await?;
        self.guarded(permit, |core| {
            core.roles.clear(&core.plans);
            Ok(())
        })
    }

    /// Attached roles, sorted by name.
    pub fn roles(&self) -> Vec<RoleInfo> {
        self.core.roles.snapshot()
    }

    // ========================================================================
    // Structure: direct plans
    // ========================================================================

    /// Register a start plan outside any role. Direct plans survive role
    /// removal and are never retracted.
    pub async fn add_start_plan(&self, plan: Arc<dyn Plan>) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| {
            core.plans.add_start_plan(plan, None);
            Ok(())
        })
    }

    /// Register a stop plan outside any role.
    pub async fn add_stop_plan(&self, plan: Arc<dyn Plan>) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| {
            core.plans.add_stop_plan(plan, None);
            Ok(())
        })
    }

    /// Register an event plan outside any role.
    pub async fn add_event_plan(
        &self,
        matcher: Arc<dyn EventMatcher>,
        plan: Arc<dyn Plan>,
    ) -> Result<()> {
        let permit = self.core.gate.acquire().await;
        self.guarded(permit, |core| {
            core.plans.add_event_plan(matcher, plan, None);
            Ok(())
        })
    }

    // ========================================================================
    // Services
    // ========================================================================

    /// Put a typed service into the agent's own scope.
    pub fn put_service<T: Any + Send + Sync>(&self, value: T) {
        self.core.scope.put(value);
    }

    /// Typed lookup, walking up to the host scope while deployed.
    pub fn get_service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.core.scope.get::<T>()
    }

    pub fn put_named_service<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.core.scope.put_named(key, value);
    }

    pub fn get_named_service<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.core.scope.get_named::<T>(key)
    }

    /// Install a service that participates in deploy and undeploy.
    pub fn install_service<T>(&self, service: Arc<T>)
    where
        T: ServiceHook + Any + Send + Sync,
    {
        self.core.scope.install(service);
    }

    // ========================================================================
    // Gate plumbing
    // ========================================================================

    fn try_permit(&self) -> Result<RunPermit> {
        self.core
            .gate
            .try_acquire()
            .ok_or_else(|| Error::gate_busy(self.core.id))
    }

    async fn timed_permit(&self, limit: Duration) -> Result<RunPermit> {
        self.core
            .gate
            .acquire_timeout(limit)
            .await
            .ok_or_else(|| Error::gate_timeout(self.core.id, limit.as_millis() as u64))
    }

    fn add_role_guarded(&self, permit: RunPermit, source: RoleSource) -> Result<RoleId> {
        self.guarded(permit, |core| {
            let role = core.roles.create(source, &core.scope)?;
            Ok(core.roles.add(role, &core.plans))
        })
    }

    /// Run a structural mutation under an already-acquired permit.
    ///
    /// Gate first, state second: contention with a running agent
    /// surfaces as gate contention in the non-blocking modes; only a
    /// held gate plus a non-idle state is a lifecycle violation. While
    /// the permit is held here the state can only be UNKNOWN, IDLE or
    /// TRANSIT, because a run parks the permit for its whole duration.
    fn guarded<R>(
        &self,
        permit: RunPermit,
        mutate: impl FnOnce(&AgentCore) -> Result<R>,
    ) -> Result<R> {
        let state = self.core.state.load();
        if !state.allows_structural_change() {
            drop(permit);
            return Err(Error::state_rejection(self.core.id, state));
        }
        let out = mutate(&self.core);
        drop(permit);
        out
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.core.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for agents with non-default tuning.
#[derive(Default)]
pub struct AgentBuilder {
    config: AgentConfig,
    spawner: Option<Arc<dyn Spawner>>,
}

impl AgentBuilder {
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Pin the spawner instead of resolving one from the host scope at
    /// deploy time.
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Result<Agent> {
        self.config.validate()?;
        Ok(Agent {
            core: AgentCore::new(self.config, self.spawner),
        })
    }
}
