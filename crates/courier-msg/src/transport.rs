//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Inbound event model and transport abstraction."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::{BindRequest, BindingId};
use crate::types::{Message, TransferableMessage};

/// Everything the bridge reacts to, from the transport or the destination lifecycle.
#[derive(Debug)]
pub enum BridgeEvent {
    /// Plain inbound message.
    Message(Message),
    /// Post message carrying transferable ports.
    PostMessage {
        /// Channel the message is addressed to.
        channel: String,
        /// Payload plus ports.
        message: TransferableMessage,
    },
    /// Channel-bind request.
    Bind(BindRequest),
    /// The remote end of a binding went away.
    Disconnect(BindingId),
    /// The destination context finished constructing.
    ContextCreated,
    /// The destination context was destroyed or replaced.
    ContextDestroyed,
    /// User activation occurred.
    UserActivation,
}

/// Source of bridge events.
pub trait Transport: Send + Sync {
    /// Next available event, if any.
    fn recv(&self) -> Option<BridgeEvent>;
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// In-memory transport backed by a mutex protected queue.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    queue: Arc<Mutex<VecDeque<BridgeEvent>>>,
}

impl InMemoryTransport {
    /// Create a new in-memory transport channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the bridge.
    pub fn send(&self, event: BridgeEvent) {
        self.queue.lock().push_back(event);
    }

    /// Number of events not yet consumed.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether every queued event has been consumed.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Transport for InMemoryTransport {
    fn recv(&self) -> Option<BridgeEvent> {
        self.queue.lock().pop_front()
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
