//! TigerStyle: one identity, one address, one process.
//!
//! Address directory for selkie agents. Deployment registers a
//! [`LocalAddress`] under the agent's identity; peers look it up to
//! deliver messages without holding the agent alive.

pub mod directory;
pub mod error;

pub use directory::{AgentDirectory, Deliver, LocalAddress, MemoryDirectory};
pub use error::{DirectoryError, DirectoryResult};
