//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Readiness-gated, ordered message delivery into a destination context."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod binding;
pub mod codec;
pub mod destination;
pub mod gate;
pub mod logging;
pub mod queue;
pub mod recording;
pub mod runtime;
pub mod script;
pub mod service;
pub mod transport;
pub mod types;

/// Shared result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by the bridge to its caller.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The codec could not project a payload; the message was not delivered.
    #[error("message {sequence} on channel `{channel}` could not be decoded: {source}")]
    Codec {
        /// Arrival sequence of the failed message.
        sequence: u64,
        /// Channel the message was addressed to.
        channel: String,
        /// Underlying codec failure.
        #[source]
        source: codec::CodecError,
    },
    /// Wrapper for IO errors encountered while reading scripts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A script line could not be turned into an event.
    #[error("script line {line}: {reason}")]
    Script {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// The bridge task is no longer receiving events.
    #[error("bridge task has stopped")]
    Closed,
}

pub use binding::{
    BindOutcome, BindRequest, BindingId, BindingManager, ChannelBinding, DisconnectOutcome,
    ReleaseReason,
};
pub use codec::{AnyCodec, CborCodec, Codec, CodecError, JsonCodec, PayloadEncoder};
pub use destination::{Destination, DestinationHost};
pub use gate::ReadinessGate;
pub use logging::{log_message, BridgeMetricsExporter, MessageDirection};
pub use queue::{PendingQueue, Sequenced};
pub use recording::{RecordedDelivery, RecordingDestination, RecordingHost};
pub use runtime::{channel, run_bridge, spawn_bridge, BridgeHandle, RunSummary};
pub use script::{replay_from_file, ScriptBinding, ScriptEvent, ScriptParser};
pub use service::{BridgeMetrics, BridgeService};
pub use transport::{BridgeEvent, InMemoryTransport, Transport};
pub use types::{
    DeliveryReceipt, Message, Payload, PortHandle, SenderId, TransferableMessage, NO_SENDER,
};
