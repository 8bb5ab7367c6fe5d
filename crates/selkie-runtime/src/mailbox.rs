//! TigerStyle: offers never block, wakes never hold the queue lock.
//!
//! Unbounded FIFO event queue with a wake-on-offer back reference. The
//! mailbox holds its consumer weakly so a queue full of undelivered
//! events can never keep a dropped agent alive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use selkie_core::constants::MAILBOX_PREALLOC_COUNT;
use selkie_core::Event;
use tracing::warn;

// ============================================================================
// Wake contract
// ============================================================================

/// Consumer side of the wake-on-offer contract.
///
/// Invoked after every enqueue, outside the queue lock. The implementation
/// decides whether a waiting consumer must be resumed; calls while the
/// consumer is already running are expected and must be cheap no-ops.
pub trait MailboxWake: Send + Sync {
    fn on_offer(self: Arc<Self>);
}

// ============================================================================
// Mailbox
// ============================================================================

/// Unbounded FIFO mailbox for one agent.
pub struct Mailbox {
    queue: Mutex<VecDeque<Event>>,
    waker: RwLock<Option<Weak<dyn MailboxWake>>>,
    depth_warn: usize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

impl Mailbox {
    /// `depth_warn` is the queue depth above which offers log a warning.
    /// Depth is observability only; offers are accepted regardless.
    pub fn new(depth_warn: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(MAILBOX_PREALLOC_COUNT)),
            waker: RwLock::new(None),
            depth_warn,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        }
    }

    /// Bind the consumer to wake on offers. Replaces any previous binding.
    pub fn bind_waker(&self, waker: Weak<dyn MailboxWake>) {
        *self.waker.write().unwrap() = Some(waker);
    }

    /// Enqueue an event and wake the consumer.
    ///
    /// Never blocks and never fails. The wake runs after the queue lock is
    /// released so the woken consumer can poll immediately.
    pub fn offer(&self, event: Event) {
        let depth = {
            let mut queue = self.queue.lock().unwrap();
            queue.push_back(event);
            queue.len()
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        if depth > self.depth_warn {
            warn!(depth, watermark = self.depth_warn, "mailbox depth above watermark");
        }

        let waker = self
            .waker
            .read()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(waker) = waker {
            waker.on_offer();
        }
    }

    /// Dequeue the oldest event, if any.
    pub fn poll(&self) -> Option<Event> {
        let event = self.queue.lock().unwrap().pop_front();
        if event.is_some() {
            self.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Total events offered since creation.
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total events polled out since creation.
    pub fn dequeued_count(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("depth", &self.len())
            .field("enqueued", &self.enqueued_count())
            .field("dequeued", &self.dequeued_count())
            .finish()
    }
}
