//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Message model carried across the bridge."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical sender identifier attached to every message.
pub type SenderId = i32;

/// Sender id used when a message has no specific origin.
pub const NO_SENDER: SenderId = 0;

/// Opaque serialized payload. Only the codec looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap already-encoded payload bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }
}

/// Transport handle for an auxiliary bidirectional channel travelling with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortHandle(u64);

impl PortHandle {
    /// Wrap a transport-assigned port identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Transport-assigned identifier.
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// One unit of communication. Fields are fixed at construction.
#[derive(Debug, PartialEq)]
pub struct Message {
    id: Uuid,
    received_at: DateTime<Utc>,
    internal: bool,
    channel: String,
    payload: Payload,
    sender_id: SenderId,
    ports: Vec<PortHandle>,
}

impl Message {
    /// Construct a message without auxiliary channels.
    pub fn new(
        internal: bool,
        channel: impl Into<String>,
        payload: impl Into<Payload>,
        sender_id: SenderId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            internal,
            channel: channel.into(),
            payload: payload.into(),
            sender_id,
            ports: Vec::new(),
        }
    }

    /// Attach auxiliary channels. Their ownership moves to the destination on delivery.
    pub fn with_ports(mut self, ports: Vec<PortHandle>) -> Self {
        self.ports = ports;
        self
    }

    /// Unique identifier used for tracing.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Time at which the bridge first saw the message.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Whether the message travels on the private channel.
    pub fn internal(&self) -> bool {
        self.internal
    }

    /// Logical channel the message is addressed to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Encoded payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Logical sender, [`NO_SENDER`] when unspecified.
    pub fn sender_id(&self) -> SenderId {
        self.sender_id
    }

    /// Auxiliary channels, in transfer order.
    pub fn ports(&self) -> &[PortHandle] {
        &self.ports
    }
}

/// Payload plus transferable ports, as carried by the post-message path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferableMessage {
    /// Encoded payload.
    pub payload: Payload,
    /// Ports transferred with the payload, in order.
    pub ports: Vec<PortHandle>,
}

impl TransferableMessage {
    /// Bundle a payload with its ports.
    pub fn new(payload: impl Into<Payload>, ports: Vec<PortHandle>) -> Self {
        Self {
            payload: payload.into(),
            ports,
        }
    }

    /// Convert into a user-facing message with no specific sender.
    pub fn into_message(self, channel: impl Into<String>) -> Message {
        Message::new(false, channel, self.payload, NO_SENDER).with_ports(self.ports)
    }
}

/// Handed to the active binding after a message reached the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Arrival sequence assigned by the bridge.
    pub sequence: u64,
    /// Identifier of the delivered message.
    pub message_id: Uuid,
    /// Channel the message was addressed to.
    pub channel: String,
    /// Whether the message waited in the pending queue.
    pub replayed: bool,
}
