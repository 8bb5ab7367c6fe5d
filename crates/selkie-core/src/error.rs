//! Error taxonomy for the selkie kernel.
//!
//! TigerStyle: explicit failure kinds. Callers can branch on "not deployed"
//! vs "running" vs "mid-transition" vs "gate contention" without parsing
//! message strings.

use crate::id::{AgentId, RoleId};
use crate::lifecycle::LifecycleState;
use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kernel error type.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lifecycle violations
    // =========================================================================
    /// Operation requires a deployed agent.
    #[error("agent {id} is not deployed (state {state}); deploy it into a host scope first")]
    NotDeployed { id: AgentId, state: LifecycleState },

    /// Structural operation while the run loop owns the agent.
    #[error("agent {id} is running (state {state}); structural changes require an idle agent")]
    AgentRunning { id: AgentId, state: LifecycleState },

    /// Operation raced a deployment, teardown, or stop sequence.
    #[error("agent {id} is mid-transition (state {state}); retry once it settles")]
    AgentInTransition { id: AgentId, state: LifecycleState },

    /// Stop requested on an agent whose run loop is not live.
    #[error("agent {id} is not running (state {state})")]
    AgentNotRunning { id: AgentId, state: LifecycleState },

    /// Stop requested twice.
    #[error("agent {id} is already stopping")]
    AlreadyStopping { id: AgentId },

    // =========================================================================
    // Gate contention
    // =========================================================================
    /// Non-blocking acquisition failed; the structural gate is held.
    #[error("structural gate of agent {id} is held; retry later or use a blocking call")]
    GateBusy { id: AgentId },

    /// Timed acquisition gave up.
    #[error("timed out after {waited_ms}ms waiting for the structural gate of agent {id}")]
    GateTimeout { id: AgentId, waited_ms: u64 },

    // =========================================================================
    // Deployment
    // =========================================================================
    /// Deployment wiring failed; the pre-deploy state was restored.
    #[error("deployment of agent {id} failed: {reason}")]
    DeploymentFailed { id: AgentId, reason: String },

    /// Teardown failed; the agent remains deployed.
    #[error("undeploy of agent {id} failed: {reason}")]
    UndeployFailed { id: AgentId, reason: String },

    // =========================================================================
    // Roles
    // =========================================================================
    /// The named role is not attached to this agent.
    #[error("role {role} is not attached to agent {id}")]
    RoleNotFound { id: AgentId, role: RoleId },

    /// A role descriptor's constructor rejected its parameters or scope.
    #[error("role construction failed for agent {id}: {reason}")]
    RoleConstruction { id: AgentId, reason: String },

    // =========================================================================
    // Configuration and internal
    // =========================================================================
    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Invariant breach inside the kernel.
    #[error("internal error: {reason}")]
    Internal { reason: String },

    /// Pass-through for plan and hook authors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_deployed(id: AgentId, state: LifecycleState) -> Self {
        Self::NotDeployed { id, state }
    }

    pub fn running(id: AgentId, state: LifecycleState) -> Self {
        Self::AgentRunning { id, state }
    }

    pub fn in_transition(id: AgentId, state: LifecycleState) -> Self {
        Self::AgentInTransition { id, state }
    }

    pub fn not_running(id: AgentId, state: LifecycleState) -> Self {
        Self::AgentNotRunning { id, state }
    }

    pub fn already_stopping(id: AgentId) -> Self {
        Self::AlreadyStopping { id }
    }

    pub fn gate_busy(id: AgentId) -> Self {
        Self::GateBusy { id }
    }

    pub fn gate_timeout(id: AgentId, waited_ms: u64) -> Self {
        Self::GateTimeout { id, waited_ms }
    }

    pub fn deployment_failed(id: AgentId, reason: impl Into<String>) -> Self {
        Self::DeploymentFailed {
            id,
            reason: reason.into(),
        }
    }

    pub fn undeploy_failed(id: AgentId, reason: impl Into<String>) -> Self {
        Self::UndeployFailed {
            id,
            reason: reason.into(),
        }
    }

    pub fn role_not_found(id: AgentId, role: RoleId) -> Self {
        Self::RoleNotFound { id, role }
    }

    pub fn role_construction(id: AgentId, reason: impl Into<String>) -> Self {
        Self::RoleConstruction {
            id,
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Classify a non-idle state observed by a structural operation, start,
    /// or deploy into the matching lifecycle-violation kind.
    pub fn state_rejection(id: AgentId, state: LifecycleState) -> Self {
        match state {
            LifecycleState::Unknown => Self::not_deployed(id, state),
            LifecycleState::Active | LifecycleState::Waiting => Self::running(id, state),
            LifecycleState::Transit | LifecycleState::Stopping => Self::in_transition(id, state),
            // Idle never rejects; reaching this arm is a kernel bug.
            LifecycleState::Idle => Self::internal(format!(
                "state rejection requested for idle agent {id}"
            )),
        }
    }

    /// Whether the caller may retry this error unchanged.
    ///
    /// Only gate contention qualifies: the gate may be released at any moment,
    /// while lifecycle violations need the caller to change something first.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::GateBusy { .. } | Self::GateTimeout { .. })
    }
}
