//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Async driver serialising bridge events from concurrent producers."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binding::{BindRequest, BindingId, ChannelBinding};
use crate::codec::Codec;
use crate::destination::DestinationHost;
use crate::service::BridgeService;
use crate::transport::BridgeEvent;
use crate::types::{Message, TransferableMessage};
use crate::{BridgeError, Result};

/// Cloneable producer side of a bridge running on its own task.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    /// Forward an event to the bridge task.
    pub fn send(&self, event: BridgeEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| BridgeError::Closed)
    }

    /// Forward an inbound message.
    pub fn message(&self, message: Message) -> Result<()> {
        self.send(BridgeEvent::Message(message))
    }

    /// Forward an inbound post message.
    pub fn post_message(
        &self,
        channel: impl Into<String>,
        message: TransferableMessage,
    ) -> Result<()> {
        self.send(BridgeEvent::PostMessage {
            channel: channel.into(),
            message,
        })
    }

    /// Forward a channel-bind request, returning the identifier a later
    /// disconnect must name.
    pub fn bind(&self, binding: impl ChannelBinding + 'static) -> Result<BindingId> {
        let request = BindRequest::new(binding);
        let id = request.id();
        self.send(BridgeEvent::Bind(request))?;
        Ok(id)
    }

    /// Report that binding `id` lost its remote end.
    pub fn disconnect(&self, id: BindingId) -> Result<()> {
        self.send(BridgeEvent::Disconnect(id))
    }

    /// Report that the destination context finished constructing.
    pub fn context_created(&self) -> Result<()> {
        self.send(BridgeEvent::ContextCreated)
    }

    /// Report that the destination context went away.
    pub fn context_destroyed(&self) -> Result<()> {
        self.send(BridgeEvent::ContextDestroyed)
    }

    /// Report user activation.
    pub fn user_activation(&self) -> Result<()> {
        self.send(BridgeEvent::UserActivation)
    }
}

/// Create a connected handle and event receiver.
pub fn channel() -> (BridgeHandle, UnboundedReceiver<BridgeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BridgeHandle { tx }, rx)
}

/// What a bridge task did before its event stream closed.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Events applied, failed ones included.
    pub events: usize,
    /// Per-event failures, in the order they happened.
    pub failures: Vec<BridgeError>,
}

/// Apply events until every [`BridgeHandle`] has been dropped.
///
/// A failing event is logged and recorded; the loop keeps going.
pub async fn run_bridge<H, C>(
    mut service: BridgeService<H, C>,
    mut events: UnboundedReceiver<BridgeEvent>,
) -> (BridgeService<H, C>, RunSummary)
where
    H: DestinationHost,
    C: Codec<H::Context>,
{
    let mut summary = RunSummary::default();
    info!(destination = service.destination(), "bridge task started");
    while let Some(event) = events.recv().await {
        summary.events += 1;
        if let Err(err) = service.handle(event) {
            warn!(destination = service.destination(), error = %err, "bridge event failed");
            summary.failures.push(err);
        }
    }
    debug!(
        destination = service.destination(),
        events = summary.events,
        failures = summary.failures.len(),
        "bridge event stream closed"
    );
    (service, summary)
}

/// Move `service` onto a tokio task and return the handle producers use to reach it.
pub fn spawn_bridge<H, C>(
    service: BridgeService<H, C>,
) -> (BridgeHandle, JoinHandle<(BridgeService<H, C>, RunSummary)>)
where
    H: DestinationHost + Send + 'static,
    C: Codec<H::Context> + Send + 'static,
{
    let (handle, events) = channel();
    let task = tokio::spawn(run_bridge(service, events));
    (handle, task)
}
