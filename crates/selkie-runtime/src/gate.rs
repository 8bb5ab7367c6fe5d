//! TigerStyle: one permit, owned by whoever holds the structure still.
//!
//! The structural gate serializes role and plan mutation against the run
//! loop. A running agent parks the permit for its entire run, so every
//! structural call made meanwhile either waits, fails fast, or times out.
//! The permit is an owned value rather than a held lock guard; it can be
//! acquired in one task, parked in the agent, and released from the task
//! that finishes the stop phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Exclusive right to mutate the agent's structure, or to run.
pub struct RunPermit {
    _permit: OwnedSemaphorePermit,
}

/// Single-permit gate over the agent's structure.
pub struct StructuralGate {
    semaphore: Arc<Semaphore>,
}

impl StructuralGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait until the gate is free. Waiters resume in FIFO order.
    pub async fn acquire(&self) -> RunPermit {
        // The semaphore is never closed, so acquisition only fails if it
        // were; treat that as unreachable by construction.
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => RunPermit { _permit: permit },
            Err(_) => unreachable!("structural gate semaphore is never closed"),
        }
    }

    /// Take the gate only if it is free right now.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(RunPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => {
                unreachable!("structural gate semaphore is never closed")
            }
        }
    }

    /// Wait for the gate up to `limit`.
    pub async fn acquire_timeout(&self, limit: Duration) -> Option<RunPermit> {
        tokio::time::timeout(limit, self.acquire()).await.ok()
    }

    /// Whether someone currently holds the permit.
    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for StructuralGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StructuralGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralGate")
            .field("held", &self.is_held())
            .finish()
    }
}
