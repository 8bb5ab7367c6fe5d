//! TigerStyle: addresses never outlive their agents.
//!
//! A [`LocalAddress`] holds a weak reference to the delivery endpoint of an
//! in-process agent. Dropping the agent invalidates every address that
//! points at it; delivery through a stale address fails with
//! [`DirectoryError::AddressDead`] instead of resurrecting the target.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use selkie_core::{AgentId, Message};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult};

// ============================================================================
// Delivery endpoint
// ============================================================================

/// Inbound message sink of a single agent.
///
/// Delivery is fire-and-forget: the endpoint enqueues the message and
/// returns without waiting for any plan to run.
pub trait Deliver: Send + Sync {
    fn deliver(&self, message: Message);
}

// ============================================================================
// Local address
// ============================================================================

/// Handle for reaching an agent hosted in this process.
#[derive(Clone)]
pub struct LocalAddress {
    id: AgentId,
    target: Weak<dyn Deliver>,
}

impl LocalAddress {
    pub fn new(id: AgentId, target: Weak<dyn Deliver>) -> Self {
        Self { id, target }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Whether the target endpoint is still alive.
    pub fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Hand the message to the target's mailbox.
    pub fn deliver(&self, message: Message) -> DirectoryResult<()> {
        match self.target.upgrade() {
            Some(target) => {
                target.deliver(message);
                Ok(())
            }
            None => Err(DirectoryError::address_dead(self.id)),
        }
    }
}

impl std::fmt::Debug for LocalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAddress")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Identity to address mapping for deployed agents.
///
/// Deployment registers the agent's address here and undeployment removes
/// it. Registration under an identity that is already mapped replaces the
/// old address and reports the displaced one, so a redeploy is a single
/// call rather than deregister-then-register.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Insert or replace the mapping for `address.id()`.
    ///
    /// Returns the displaced address when the identity was already mapped.
    async fn register(&self, address: LocalAddress) -> DirectoryResult<Option<LocalAddress>>;

    /// Remove the mapping for `id`.
    async fn deregister(&self, id: AgentId) -> DirectoryResult<()>;

    /// Current address for `id`, if any.
    async fn lookup(&self, id: AgentId) -> DirectoryResult<Option<LocalAddress>>;

    /// Number of registered agents.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Resolve `id` and deliver the message to it.
    async fn deliver(&self, id: AgentId, message: Message) -> DirectoryResult<()> {
        match self.lookup(id).await? {
            Some(address) => address.deliver(message),
            None => Err(DirectoryError::not_registered(id)),
        }
    }
}

/// In-memory directory for a single process.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<AgentId, LocalAddress>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl AgentDirectory for MemoryDirectory {
    async fn register(&self, address: LocalAddress) -> DirectoryResult<Option<LocalAddress>> {
        let id = address.id();
        let displaced = self.entries.write().await.insert(id, address);
        debug!(agent = %id, replaced = displaced.is_some(), "registered");
        Ok(displaced)
    }

    async fn deregister(&self, id: AgentId) -> DirectoryResult<()> {
        match self.entries.write().await.remove(&id) {
            Some(_) => {
                debug!(agent = %id, "deregistered");
                Ok(())
            }
            None => Err(DirectoryError::not_registered(id)),
        }
    }

    async fn lookup(&self, id: AgentId) -> DirectoryResult<Option<LocalAddress>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
