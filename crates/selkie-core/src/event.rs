//! Events, messages, and bound parameters.
//!
//! Events are opaque to the kernel: the mailbox queues them and the plan
//! catalogue's matchers inspect them by downcasting. The kernel never looks
//! inside.

use crate::id::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Event
// =============================================================================

/// An opaque event value routed through an agent's mailbox.
///
/// The payload is shared, so clones are cheap and an event survives being
/// handed to several matched plans. The label is the payload's type name and
/// exists for logs only.
#[derive(Clone)]
pub struct Event {
    label: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self {
            label: type_name::<T>(),
            payload: Arc::new(payload),
        }
    }

    /// Type name of the payload, for logs.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Event").field(&self.label).finish()
    }
}

// =============================================================================
// Message
// =============================================================================

/// A speech-act message delivered to an agent from outside.
///
/// `Agent::notify` wraps the message into an [`Event`] and offers it; plans
/// match on it like on any other event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Speech-act kind, e.g. "inform" or "request".
    pub performative: String,
    /// Identity of the sending agent, if known.
    pub sender: Option<AgentId>,
    /// Free-form body.
    pub content: Value,
}

impl Message {
    pub fn new(performative: impl Into<String>, content: Value) -> Self {
        Self {
            performative: performative.into(),
            sender: None,
            content,
        }
    }

    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.sender = Some(sender);
        self
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Event::new(message)
    }
}

// =============================================================================
// Params
// =============================================================================

/// Named values bound by a matcher for one plan invocation.
///
/// Values are type-erased; plans read them back with [`Params::get`]. An
/// empty bag is valid (a matcher may accept an event without binding
/// anything).
#[derive(Default, Clone)]
pub struct Params {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Builder form of [`Params::insert`].
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Typed read; `None` if the key is absent or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_tuple("Params").field(&keys).finish()
    }
}
