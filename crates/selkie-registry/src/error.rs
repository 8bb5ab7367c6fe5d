//! Directory errors.

use selkie_core::AgentId;
use thiserror::Error;

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

#[derive(Error, Debug)]
pub enum DirectoryError {
    /// No address is registered under this identity.
    #[error("agent {id} is not registered")]
    NotRegistered { id: AgentId },

    /// The address is registered but its target has been dropped.
    /// The entry is stale and should be deregistered.
    #[error("agent {id} has a registered address but no live target")]
    AddressDead { id: AgentId },
}

impl DirectoryError {
    pub fn not_registered(id: AgentId) -> Self {
        Self::NotRegistered { id }
    }

    pub fn address_dead(id: AgentId) -> Self {
        Self::AddressDead { id }
    }
}
