//! Service scope and deploy-hook surface for selkie agents.
//!
//! This crate is the dependency-wiring collaborator of the kernel: a
//! hierarchical key/value scope agents resolve services through, and the
//! hook trait deployment runs against. It owns no agent semantics.

pub mod error;
pub mod hook;
pub mod scope;

pub use error::{ContainerError, ContainerResult};
pub use hook::ServiceHook;
pub use scope::ServiceScope;
