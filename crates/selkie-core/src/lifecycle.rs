//! Agent lifecycle states and the atomic cell that holds them.
//!
//! TigerStyle: the state machine is total. Every (state, trigger) pair either
//! has a defined successor or a defined rejection; nothing is left implicit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one agent.
///
/// State diagram:
///
/// ```text
///                 deploy            start
///   UNKNOWN ───▶ TRANSIT ───▶ IDLE ───▶ ACTIVE ◀──────┐
///      ▲            │          ▲ ▲        │  ▲        │ wake
///      └────────────┘          │ │  empty │  │ resume │
///        undeploy /            │ │        ▼  │        │
///        failed deploy         │ │      WAITING ──────┘
///                              │ │        │
///                              │ └─ stop ─┤
///                              │          ▼
///                              └────── STOPPING
/// ```
///
/// `UNKNOWN` is the only initial value and permits no role operations until
/// deployment completes. `ACTIVE` and `WAITING` alternate while the run loop
/// drains the mailbox; both reject structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed but not yet deployed into a hosting scope.
    Unknown,
    /// Deployed and quiescent; the only state permitting structural mutation.
    Idle,
    /// The run loop is draining the mailbox.
    Active,
    /// The run loop is parked on an empty mailbox.
    Waiting,
    /// Mid-deployment or mid-teardown.
    Transit,
    /// The stop sequence is running.
    Stopping,
}

impl LifecycleState {
    /// Whether the run-loop chain is live (parked counts as live).
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Active | Self::Waiting)
    }

    /// Whether role-structure mutation is permitted in this state.
    pub fn allows_structural_change(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unknown, Transit)      // deploy begins
                | (Idle, Transit)   // redeploy or teardown begins
                | (Transit, Idle)   // deploy completed
                | (Transit, Unknown) // teardown completed or deploy rolled back
                | (Idle, Active)    // start
                | (Active, Waiting) // mailbox drained
                | (Waiting, Active) // wake
                | (Active, Stopping)
                | (Waiting, Stopping)
                | (Stopping, Idle)  // stop sequence finished
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Idle,
            2 => Self::Active,
            3 => Self::Waiting,
            4 => Self::Transit,
            5 => Self::Stopping,
            _ => unreachable!("invalid lifecycle state tag: {value}"),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Idle => 1,
            Self::Active => 2,
            Self::Waiting => 3,
            Self::Transit => 4,
            Self::Stopping => 5,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Transit => "transit",
            Self::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Atomically updated holder of one agent's lifecycle state.
///
/// All accesses are sequentially consistent, so a reader never observes a
/// value older than one it has already seen and writers never lose an update.
/// Transitions go through [`StateCell::transition`] so contention is decided
/// by exactly one winner.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// A fresh cell starts in `Unknown`.
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Unknown.as_u8()))
    }

    /// Current state.
    pub fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Unconditional store. Callers must know no competing writer exists for
    /// the transition they perform (e.g. the stop-task settling to idle).
    pub fn store(&self, next: LifecycleState) {
        debug_assert!(
            self.load().can_transition_to(next),
            "illegal transition {} -> {}",
            self.load(),
            next,
        );
        self.0.store(next.as_u8(), Ordering::SeqCst);
    }

    /// Transition `from -> next` if the cell still holds `from`.
    ///
    /// Returns `Ok(from)` when this call won the transition, `Err(actual)`
    /// with the observed state otherwise.
    pub fn transition(
        &self,
        from: LifecycleState,
        next: LifecycleState,
    ) -> Result<LifecycleState, LifecycleState> {
        debug_assert!(
            from.can_transition_to(next),
            "illegal transition {from} -> {next}",
        );
        self.0
            .compare_exchange(
                from.as_u8(),
                next.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(LifecycleState::from_u8)
            .map_err(LifecycleState::from_u8)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
