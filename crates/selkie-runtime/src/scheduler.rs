//! TigerStyle: the chain resubmits itself; nothing polls, nothing spins.
//!
//! Run loop of one agent as a chain of short tasks on the shared
//! spawner: a start task, then one step task per mailbox cycle, then a
//! stop task. At most one task of a chain is in flight per agent, which
//! makes plan execution sequential per agent while distinct agents share
//! the pool freely. A parked chain leaves no task in flight at all; the
//! wake-on-offer path in the mailbox restarts it.
//!
//! Hand-off rules, all decided by the state cell:
//!
//! - step observes an empty mailbox: flip ACTIVE to WAITING, then
//!   re-check the mailbox for offers that raced the flip. Whoever wins
//!   the WAITING to ACTIVE flip (this re-check or a wake) owns the one
//!   resubmit.
//! - stop requested mid-cycle: the cell reads STOPPING after the cycle
//!   and the chain submits the stop task instead of the next step.

use std::sync::Arc;
use std::time::Instant;

use selkie_core::{LifecycleState, Params};
use tracing::{debug, error, info, warn};

use crate::agent::AgentCore;
use crate::plan::Plan;

impl AgentCore {
    pub(crate) fn submit_start(self: &Arc<Self>) {
        let Some(spawner) = self.spawner() else {
            error!(agent = %self.id, "no spawner bound; dropping start task");
            return;
        };
        let core = self.clone();
        spawner.spawn(Box::pin(async move { core.start_task().await }));
    }

    pub(crate) fn submit_step(self: &Arc<Self>) {
        let Some(spawner) = self.spawner() else {
            error!(agent = %self.id, "no spawner bound; dropping step task");
            return;
        };
        let core = self.clone();
        spawner.spawn(Box::pin(async move { core.step_task().await }));
    }

    pub(crate) fn submit_stop(self: &Arc<Self>) {
        let Some(spawner) = self.spawner() else {
            error!(agent = %self.id, "no spawner bound; dropping stop task");
            return;
        };
        let core = self.clone();
        spawner.spawn(Box::pin(async move { core.stop_task().await }));
    }

    /// Run every start plan once, then enter the step cycle.
    async fn start_task(self: Arc<Self>) {
        debug!(agent = %self.id, "run starting");
        for plan in self.plans.start_plans() {
            self.run_plan(&plan, None, "start").await;
        }
        self.continue_chain("start");
    }

    /// One mailbox cycle: poll one event, run every matched plan, then
    /// resubmit, park, or hand off to the stop task.
    async fn step_task(self: Arc<Self>) {
        match self.mailbox.poll() {
            Some(event) => {
                let options = self.plans.options_for(&event);
                debug!(
                    agent = %self.id,
                    event = event.label(),
                    options = options.len(),
                    "handling event"
                );
                for option in &options {
                    self.run_plan(&option.plan, Some(&option.params), "event").await;
                }
                self.continue_chain("step");
            }
            None => self.park(),
        }
    }

    /// Run every stop plan once, settle IDLE, release the gate.
    ///
    /// IDLE is stored before the permit drops: a structural caller
    /// resuming on the release must observe an idle agent.
    async fn stop_task(self: Arc<Self>) {
        debug!(agent = %self.id, "run stopping");
        for plan in self.plans.stop_plans() {
            self.run_plan(&plan, None, "stop").await;
        }

        let permit = self.run_permit.lock().unwrap().take();
        if permit.is_none() {
            error!(agent = %self.id, "stop task found no parked run permit");
        }
        self.state.store(LifecycleState::Idle);
        drop(permit);
        info!(agent = %self.id, "stopped");
    }

    /// Park after an empty poll, re-checking for offers that raced the
    /// flip to WAITING. The winner of the WAITING to ACTIVE flip owns
    /// the single resubmit, so the chain never forks and never loses a
    /// wake.
    fn park(self: &Arc<Self>) {
        match self
            .state
            .transition(LifecycleState::Active, LifecycleState::Waiting)
        {
            Ok(_) => {
                if !self.mailbox.is_empty()
                    && self
                        .state
                        .transition(LifecycleState::Waiting, LifecycleState::Active)
                        .is_ok()
                {
                    self.submit_step();
                }
            }
            Err(LifecycleState::Stopping) => self.submit_stop(),
            Err(actual) => {
                error!(agent = %self.id, state = %actual, "unexpected state at park");
            }
        }
    }

    /// After a completed cycle: next step, or hand off to the stop task
    /// if a stop arrived mid-cycle.
    fn continue_chain(self: &Arc<Self>, after: &'static str) {
        match self.state.load() {
            LifecycleState::Active => self.submit_step(),
            LifecycleState::Stopping => self.submit_stop(),
            actual => {
                error!(agent = %self.id, state = %actual, after, "unexpected state in run chain");
            }
        }
    }

    /// Execute one plan with fault isolation and duration accounting. A
    /// failed plan is logged and skipped; the cycle continues.
    async fn run_plan(&self, plan: &Arc<dyn Plan>, params: Option<&Params>, kind: &'static str) {
        let started = Instant::now();
        let result = plan.execute(&self.ctx, params).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(error) = result {
            error!(agent = %self.id, plan = plan.name(), kind, %error, "plan failed");
        }
        if elapsed_ms > self.config.slow_plan_warn_ms {
            warn!(
                agent = %self.id,
                plan = plan.name(),
                kind,
                elapsed_ms,
                "slow plan"
            );
        }
    }
}
