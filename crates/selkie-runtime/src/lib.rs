//! TigerStyle: sequential per agent, parallel across agents.
//!
//! Execution kernel for selkie agents: the [`Agent`] façade over an
//! atomic lifecycle, a structural gate, an unbounded wake-on-offer
//! mailbox, and plan and role bases. The run loop is a chain of
//! resubmitting tasks on a shared spawner; see the scheduler module for
//! the hand-off rules.
//!
//! ```no_run
//! use std::sync::Arc;
//! use selkie_container::ServiceScope;
//! use selkie_registry::{AgentDirectory, MemoryDirectory};
//! use selkie_runtime::Agent;
//!
//! # async fn demo() -> selkie_core::Result<()> {
//! let host = Arc::new(ServiceScope::new());
//! let directory: Arc<dyn AgentDirectory> = MemoryDirectory::shared();
//! host.put(directory);
//!
//! let agent = Agent::new();
//! agent.deploy(&host).await?;
//! agent.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod gate;
pub mod mailbox;
pub mod plan;
pub mod role;

mod scheduler;

pub use agent::{Agent, AgentBuilder};
pub use gate::{RunPermit, StructuralGate};
pub use mailbox::{Mailbox, MailboxWake};
pub use plan::{
    EventMatcher, FnMatcher, FnPlan, Plan, PlanBase, PlanContext, PlanFn, PlanOption, TypeMatcher,
};
pub use role::{Contribution, Role, RoleBase, RoleBehavior, RoleDescriptor, RoleInfo, RoleSource};
