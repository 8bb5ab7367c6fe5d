//! Core vocabulary for the selkie agent kernel.
//!
//! selkie is the execution core of a multi-agent runtime: agents drain a
//! private event mailbox through a sequential task chain while their role
//! structure is fenced behind a gate held for the whole run phase. This crate
//! holds the shared types: identities, the lifecycle state machine, event and
//! parameter values, the worker-pool seam, errors, limits, and telemetry.

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod id;
pub mod lifecycle;
pub mod spawn;
pub mod telemetry;

pub use config::AgentConfig;
pub use error::{Error, Result};
pub use event::{Event, Message, Params};
pub use id::{AgentId, RoleId};
pub use lifecycle::{LifecycleState, StateCell};
pub use spawn::{Spawner, TokioSpawner};
pub use telemetry::{init_telemetry, TelemetryConfig};
