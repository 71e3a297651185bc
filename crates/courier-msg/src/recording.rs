//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "In-memory destination that records entry point invocations."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::destination::{Destination, DestinationHost};
use crate::types::{PortHandle, SenderId};

/// One invocation of the destination entry point, arguments in call order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedDelivery {
    /// Private-channel flag.
    pub internal: bool,
    /// Addressed channel.
    pub channel: String,
    /// Entangled auxiliary channels.
    pub ports: Vec<PortHandle>,
    /// Projected payload.
    pub payload: JsonValue,
    /// Logical sender.
    pub sender_id: SenderId,
}

/// Destination that keeps every delivery in memory.
#[derive(Debug)]
pub struct RecordingDestination {
    deliveries: Vec<RecordedDelivery>,
    user_activations: usize,
    entry_point_registered: bool,
}

impl Default for RecordingDestination {
    fn default() -> Self {
        Self {
            deliveries: Vec::new(),
            user_activations: 0,
            entry_point_registered: true,
        }
    }
}

impl RecordingDestination {
    /// A destination whose entry point has not been registered yet.
    pub fn without_entry_point() -> Self {
        Self {
            entry_point_registered: false,
            ..Self::default()
        }
    }

    /// Deliveries in the order the entry point saw them.
    pub fn deliveries(&self) -> &[RecordedDelivery] {
        &self.deliveries
    }

    /// Channels of every delivery, in order.
    pub fn channels(&self) -> Vec<&str> {
        self.deliveries.iter().map(|d| d.channel.as_str()).collect()
    }

    /// Number of user activation notifications received.
    pub fn user_activations(&self) -> usize {
        self.user_activations
    }
}

impl Destination for RecordingDestination {
    type Value = JsonValue;
    type Port = PortHandle;

    fn has_entry_point(&self) -> bool {
        self.entry_point_registered
    }

    fn on_message(
        &mut self,
        internal: bool,
        channel: &str,
        ports: Vec<PortHandle>,
        payload: JsonValue,
        sender_id: SenderId,
    ) {
        self.deliveries.push(RecordedDelivery {
            internal,
            channel: channel.to_owned(),
            ports,
            payload,
            sender_id,
        });
    }

    fn notify_user_activation(&mut self) {
        self.user_activations += 1;
    }
}

/// Host owning at most one [`RecordingDestination`].
#[derive(Debug, Default)]
pub struct RecordingHost {
    context: Option<RecordingDestination>,
}

impl RecordingHost {
    /// A host whose destination context already exists.
    pub fn with_context() -> Self {
        Self {
            context: Some(RecordingDestination::default()),
        }
    }

    /// A host wrapping a specific destination.
    pub fn with_destination(destination: RecordingDestination) -> Self {
        Self {
            context: Some(destination),
        }
    }

    /// Install a fresh context, returning the one it replaced.
    pub fn attach(&mut self) -> Option<RecordingDestination> {
        self.context.replace(RecordingDestination::default())
    }

    /// Remove the context, as when the frame backing it goes away.
    pub fn detach(&mut self) -> Option<RecordingDestination> {
        self.context.take()
    }

    /// The current context, if any.
    pub fn context(&self) -> Option<&RecordingDestination> {
        self.context.as_ref()
    }

    /// Deliveries recorded by the current context; empty when there is none.
    pub fn deliveries(&self) -> &[RecordedDelivery] {
        self.context
            .as_ref()
            .map(RecordingDestination::deliveries)
            .unwrap_or_default()
    }
}

impl DestinationHost for RecordingHost {
    type Context = RecordingDestination;

    fn current_context(&mut self) -> Option<&mut RecordingDestination> {
        self.context.as_mut()
    }
}
