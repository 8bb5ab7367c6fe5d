//! TigerStyle: roles own their plans, the base owns the roles.
//!
//! A role is the unit of behaviour composition: it contributes start,
//! stop and event plans as one block, identified by a fresh [`RoleId`] so
//! removal retracts exactly what was added. The base itself takes no part
//! in scheduling and carries no gate; callers serialize mutation through
//! the agent's structural gate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use selkie_container::ServiceScope;
use selkie_core::{AgentId, Error, Params, Result, RoleId};
use tracing::debug;

use crate::plan::{EventMatcher, Plan, PlanBase};

// ============================================================================
// Contribution
// ============================================================================

/// The plans a role wires into its agent on attachment.
#[derive(Default)]
pub struct Contribution {
    start_plans: Vec<Arc<dyn Plan>>,
    stop_plans: Vec<Arc<dyn Plan>>,
    event_plans: Vec<(Arc<dyn EventMatcher>, Arc<dyn Plan>)>,
}

impl Contribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, plan: Arc<dyn Plan>) -> Self {
        self.start_plans.push(plan);
        self
    }

    pub fn on_stop(mut self, plan: Arc<dyn Plan>) -> Self {
        self.stop_plans.push(plan);
        self
    }

    pub fn on_event(mut self, matcher: Arc<dyn EventMatcher>, plan: Arc<dyn Plan>) -> Self {
        self.event_plans.push((matcher, plan));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.start_plans.is_empty() && self.stop_plans.is_empty() && self.event_plans.is_empty()
    }
}

// ============================================================================
// Behaviour and sources
// ============================================================================

/// Behaviour of one role: given its construction parameters, name the
/// plans it contributes.
pub trait RoleBehavior: Send + Sync {
    fn name(&self) -> &str;

    fn contribute(&self, params: &Params) -> Result<Contribution>;
}

/// Recipe for building a [`RoleBehavior`] against a service scope.
///
/// The constructor runs at attach time with the agent's own scope, so it
/// can resolve collaborators the host provides.
pub struct RoleDescriptor {
    name: String,
    construct: Box<dyn Fn(&Arc<ServiceScope>) -> Result<Arc<dyn RoleBehavior>> + Send + Sync>,
}

impl RoleDescriptor {
    pub fn new<F>(name: impl Into<String>, construct: F) -> Arc<Self>
    where
        F: Fn(&Arc<ServiceScope>) -> Result<Arc<dyn RoleBehavior>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            construct: Box::new(construct),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self, scope: &Arc<ServiceScope>) -> Result<Arc<dyn RoleBehavior>> {
        (self.construct)(scope)
    }
}

/// What to build a role from: a descriptor constructed at attach time, or
/// a ready behaviour instance.
pub enum RoleSource {
    Descriptor {
        descriptor: Arc<RoleDescriptor>,
        params: Params,
    },
    Instance {
        behavior: Arc<dyn RoleBehavior>,
        params: Params,
    },
}

impl RoleSource {
    pub fn descriptor(descriptor: Arc<RoleDescriptor>, params: Params) -> Self {
        Self::Descriptor { descriptor, params }
    }

    pub fn instance(behavior: Arc<dyn RoleBehavior>, params: Params) -> Self {
        Self::Instance { behavior, params }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Descriptor { descriptor, .. } => descriptor.name(),
            Self::Instance { behavior, .. } => behavior.name(),
        }
    }
}

// ============================================================================
// Role
// ============================================================================

/// A constructed role, not yet attached. Owned exclusively by whoever
/// holds it; attachment consumes it.
pub struct Role {
    id: RoleId,
    name: String,
    contribution: Contribution,
}

impl Role {
    pub fn id(&self) -> RoleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Role")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Identity and name of an attached role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

// ============================================================================
// Role base
// ============================================================================

/// The roles attached to one agent, keyed by identity.
pub struct RoleBase {
    agent: AgentId,
    records: RwLock<HashMap<RoleId, String>>,
}

impl RoleBase {
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Construct a role from its source. Pure construction: nothing is
    /// attached and no plan is wired.
    pub fn create(&self, source: RoleSource, scope: &Arc<ServiceScope>) -> Result<Role> {
        let (behavior, params) = match source {
            RoleSource::Descriptor { descriptor, params } => {
                let behavior = descriptor.construct(scope).map_err(|err| {
                    Error::role_construction(
                        self.agent,
                        format!("{}: {err}", descriptor.name()),
                    )
                })?;
                (behavior, params)
            }
            RoleSource::Instance { behavior, params } => (behavior, params),
        };

        let contribution = behavior.contribute(&params).map_err(|err| {
            Error::role_construction(self.agent, format!("{}: {err}", behavior.name()))
        })?;

        Ok(Role {
            id: RoleId::random(),
            name: behavior.name().to_string(),
            contribution,
        })
    }

    /// Attach a constructed role: wire its plans into `plans` and record
    /// it. From the next run cycle on, its event plans are eligible.
    pub fn add(&self, role: Role, plans: &PlanBase) -> RoleId {
        let Role {
            id,
            name,
            contribution,
        } = role;
        let Contribution {
            start_plans,
            stop_plans,
            event_plans,
        } = contribution;

        for plan in start_plans {
            plans.add_start_plan(plan, Some(id));
        }
        for plan in stop_plans {
            plans.add_stop_plan(plan, Some(id));
        }
        for (matcher, plan) in event_plans {
            plans.add_event_plan(matcher, plan, Some(id));
        }

        self.records.write().unwrap().insert(id, name.clone());
        debug!(agent = %self.agent, role = %id, name, "role attached");
        id
    }

    /// Detach a role and retract every plan it contributed.
    pub fn remove(&self, role: RoleId, plans: &PlanBase) -> Result<()> {
        match self.records.write().unwrap().remove(&role) {
            Some(name) => {
                plans.retract_owner(role);
                debug!(agent = %self.agent, role = %role, name, "role detached");
                Ok(())
            }
            None => Err(Error::role_not_found(self.agent, role)),
        }
    }

    /// Promote an attached role to active.
    ///
    /// Attachment already makes a role's plans eligible, so promotion is
    /// idempotent. The call exists to reject identities that were never
    /// attached to this agent.
    pub fn activate(&self, role: RoleId) -> Result<()> {
        if self.records.read().unwrap().contains_key(&role) {
            Ok(())
        } else {
            Err(Error::role_not_found(self.agent, role))
        }
    }

    /// Detach every role and retract all their plans.
    pub fn clear(&self, plans: &PlanBase) {
        let drained: Vec<RoleId> = self
            .records
            .write()
            .unwrap()
            .drain()
            .map(|(id, _)| id)
            .collect();
        for id in &drained {
            plans.retract_owner(*id);
        }
        debug!(agent = %self.agent, count = drained.len(), "roles cleared");
    }

    /// Attached roles, sorted by name for stable output.
    pub fn snapshot(&self) -> Vec<RoleInfo> {
        let mut roles: Vec<RoleInfo> = self
            .records
            .read()
            .unwrap()
            .iter()
            .map(|(id, name)| RoleInfo {
                id: *id,
                name: name.clone(),
            })
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    pub fn contains(&self, role: RoleId) -> bool {
        self.records.read().unwrap().contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}
