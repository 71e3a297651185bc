//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Delivery dispatcher tying gate, queue, bindings and destination together."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use courier_common::{BindingResetPolicy, BridgeConfig};
use courier_logging::{
    courier_debug, courier_error, courier_info, courier_warn, log_lifecycle_event,
    LifecycleOutcome, LogContext,
};

use crate::binding::{BindOutcome, BindRequest, BindingId, BindingManager, DisconnectOutcome};
use crate::codec::Codec;
use crate::destination::{Destination, DestinationHost};
use crate::gate::ReadinessGate;
use crate::logging::{log_message, BridgeMetricsExporter, MessageDirection};
use crate::queue::{PendingQueue, Sequenced};
use crate::transport::{BridgeEvent, Transport};
use crate::types::{DeliveryReceipt, Message, TransferableMessage};
use crate::{BridgeError, Result};

/// Snapshot of bridge counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeMetrics {
    /// Messages handed to the bridge.
    pub received: u64,
    /// Messages parked in the pending queue.
    pub buffered: u64,
    /// Messages delivered without buffering.
    pub delivered: u64,
    /// Buffered messages delivered by a drain.
    pub replayed: u64,
    /// Messages discarded because the destination could not take them.
    pub dropped: u64,
    /// Payloads the codec rejected.
    pub codec_failures: u64,
    /// Bindings made active.
    pub bindings_activated: u64,
    /// Bindings released.
    pub bindings_released: u64,
    /// Times the pending queue crossed the warning threshold.
    pub depth_warnings: u64,
    /// Largest pending queue depth seen.
    pub pending_peak: u64,
}

#[derive(Debug, Default)]
struct Tally {
    counts: BridgeMetrics,
    exporter: Option<BridgeMetricsExporter>,
}

impl Tally {
    fn received(&mut self) {
        self.counts.received += 1;
        if let Some(exporter) = &self.exporter {
            exporter.observe_received();
        }
    }

    fn buffered(&mut self, depth: usize, peak: usize) {
        self.counts.buffered += 1;
        if let Some(exporter) = &self.exporter {
            exporter.observe_buffered(depth, peak);
        }
    }

    fn depth_warning(&mut self) {
        self.counts.depth_warnings += 1;
        if let Some(exporter) = &self.exporter {
            exporter.observe_depth_warning();
        }
    }

    fn delivered(&mut self, message: &Message, replayed: bool) {
        if replayed {
            self.counts.replayed += 1;
        } else {
            self.counts.delivered += 1;
        }
        if let Some(exporter) = &self.exporter {
            if replayed {
                exporter.observe_replayed(message);
            } else {
                exporter.observe_delivered();
            }
        }
    }

    fn dropped(&mut self) {
        self.counts.dropped += 1;
        if let Some(exporter) = &self.exporter {
            exporter.observe_dropped();
        }
    }

    fn codec_failure(&mut self) {
        self.counts.codec_failures += 1;
        if let Some(exporter) = &self.exporter {
            exporter.observe_codec_failure();
        }
    }

    fn pending_depth(&self, depth: usize) {
        if let Some(exporter) = &self.exporter {
            exporter.set_pending_depth(depth);
        }
    }
}

/// Gated, ordered delivery of messages into one destination context.
///
/// Every operation takes `&mut self`, so the owner serialises all of them on
/// one logical thread. Messages that arrive before the destination is ready
/// are buffered and replayed, in arrival order, by [`BridgeService::context_created`]
/// before anything else can be delivered.
pub struct BridgeService<H, C> {
    destination: String,
    host: H,
    codec: C,
    gate: ReadinessGate,
    queue: PendingQueue,
    bindings: BindingManager,
    reset_policy: BindingResetPolicy,
    pending_warn_threshold: usize,
    depth_warned: bool,
    next_sequence: u64,
    tally: Tally,
}

impl<H, C> BridgeService<H, C>
where
    H: DestinationHost,
    C: Codec<H::Context>,
{
    /// Create a bridge with default settings.
    pub fn new(destination: impl Into<String>, host: H, codec: C) -> Self {
        let config = BridgeConfig {
            destination: destination.into(),
            ..BridgeConfig::default()
        };
        Self::from_config(&config, host, codec)
    }

    /// Create a bridge from configuration.
    pub fn from_config(config: &BridgeConfig, host: H, codec: C) -> Self {
        Self {
            destination: config.destination.clone(),
            host,
            codec,
            gate: ReadinessGate::new(),
            queue: PendingQueue::new(),
            bindings: BindingManager::new(),
            reset_policy: config.binding_reset_policy,
            pending_warn_threshold: config.pending_warn_threshold.max(1),
            depth_warned: false,
            next_sequence: 1,
            tally: Tally::default(),
        }
    }

    /// Mirror counters into prometheus.
    pub fn with_metrics_exporter(mut self, exporter: BridgeMetricsExporter) -> Self {
        exporter.set_pending_depth(self.queue.len());
        self.tally.exporter = Some(exporter);
        self
    }

    /// Inbound message from the transport. Returns the arrival sequence assigned to it.
    ///
    /// Before readiness the message is buffered untouched. Afterwards it is
    /// delivered at once. A codec failure is returned to the caller; a missing
    /// destination context drops the message.
    pub fn on_message(&mut self, message: Message) -> Result<u64> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tally.received();
        let entry = Sequenced { sequence, message };

        if !self.gate.is_ready() {
            self.buffer(entry);
            return Ok(sequence);
        }

        self.deliver(entry, false)?;
        Ok(sequence)
    }

    /// Inbound post message carrying transferable ports. Shares the gated path
    /// and the arrival order of [`BridgeService::on_message`].
    pub fn on_post_message(
        &mut self,
        channel: impl Into<String>,
        message: TransferableMessage,
    ) -> Result<u64> {
        self.on_message(message.into_message(channel))
    }

    /// Inbound channel-bind request.
    pub fn bind(&mut self, request: BindRequest) -> BindingId {
        match self.bindings.bind(request, self.gate.is_ready()) {
            BindOutcome::Activated { id, released } => {
                let ctx = self.log_context().with_binding(id.get());
                let note = match released {
                    Some(previous) => format!("binding activated, released {previous}"),
                    None => "binding activated".to_owned(),
                };
                log_lifecycle_event(Some(&ctx), "bridge.bind", &note, LifecycleOutcome::Applied);
                id
            }
            BindOutcome::Deferred { id, superseded } => {
                let ctx = self.log_context().with_binding(id.get());
                let note = match superseded {
                    Some(previous) => {
                        format!("binding deferred until ready, superseded {previous}")
                    }
                    None => "binding deferred until ready".to_owned(),
                };
                log_lifecycle_event(Some(&ctx), "bridge.bind", &note, LifecycleOutcome::Applied);
                id
            }
        }
    }

    /// The transport lost binding `id`. Buffered messages are unaffected.
    pub fn on_disconnect(&mut self, id: BindingId) -> DisconnectOutcome {
        let outcome = self.bindings.on_disconnect(id);
        let ctx = self.log_context().with_binding(id.get());
        match outcome {
            DisconnectOutcome::ReleasedActive => log_lifecycle_event(
                Some(&ctx),
                "bridge.disconnect",
                "active binding released",
                LifecycleOutcome::Applied,
            ),
            DisconnectOutcome::DiscardedPending => log_lifecycle_event(
                Some(&ctx),
                "bridge.disconnect",
                "pending binding discarded",
                LifecycleOutcome::Applied,
            ),
            DisconnectOutcome::Stale => log_lifecycle_event(
                Some(&ctx),
                "bridge.disconnect",
                "binding no longer held",
                LifecycleOutcome::Ignored,
            ),
        }
        outcome
    }

    /// The destination context finished constructing.
    ///
    /// The first call per destination lifetime promotes the pending binding and
    /// drains the pending queue in order. Later calls before a reset are no-ops.
    /// When some replayed payloads fail to decode, the rest of the queue is still
    /// delivered and the first failure is returned.
    pub fn context_created(&mut self) -> Result<()> {
        if !self.gate.mark_ready() {
            log_lifecycle_event(
                Some(&self.log_context()),
                "bridge.ready",
                "destination already ready",
                LifecycleOutcome::Ignored,
            );
            return Ok(());
        }
        log_lifecycle_event(
            Some(&self.log_context()),
            "bridge.ready",
            "destination ready",
            LifecycleOutcome::Applied,
        );
        let drained = self.on_readiness_transition();
        if let Err(err) = &drained {
            log_lifecycle_event(
                Some(&self.log_context()),
                "bridge.drain",
                &format!("pending queue drained with failures: {err}"),
                LifecycleOutcome::Fault,
            );
        }
        drained
    }

    /// The destination context was destroyed or replaced.
    ///
    /// Messages still buffered stay queued for the next context.
    pub fn context_destroyed(&mut self) {
        let epoch = self.gate.reset();
        self.bindings.on_reset(self.reset_policy);
        let note = format!(
            "destination context replaced, binding policy {}",
            self.reset_policy
        );
        log_lifecycle_event(
            Some(&self.log_context().with_epoch(epoch)),
            "bridge.reset",
            &note,
            LifecycleOutcome::Applied,
        );
    }

    /// User activation bypasses gating and ordering.
    pub fn notify_user_activation(&mut self) {
        match self.host.current_context() {
            Some(context) => context.notify_user_activation(),
            None => courier_debug!(
                context = LogContext::new().with_destination(&self.destination),
                "no destination context, user activation dropped"
            ),
        }
    }

    /// Apply one transport or lifecycle event.
    pub fn handle(&mut self, event: BridgeEvent) -> Result<()> {
        match event {
            BridgeEvent::Message(message) => self.on_message(message).map(|_| ()),
            BridgeEvent::PostMessage { channel, message } => {
                self.on_post_message(channel, message).map(|_| ())
            }
            BridgeEvent::Bind(request) => {
                self.bind(request);
                Ok(())
            }
            BridgeEvent::Disconnect(id) => {
                self.on_disconnect(id);
                Ok(())
            }
            BridgeEvent::ContextCreated => self.context_created(),
            BridgeEvent::ContextDestroyed => {
                self.context_destroyed();
                Ok(())
            }
            BridgeEvent::UserActivation => {
                self.notify_user_activation();
                Ok(())
            }
        }
    }

    /// Apply every event currently available on `transport`, in order.
    ///
    /// Stops at the first error; unread events stay on the transport.
    pub fn pump<T>(&mut self, transport: &T) -> Result<usize>
    where
        T: Transport + ?Sized,
    {
        let mut applied = 0usize;
        while let Some(event) = transport.recv() {
            self.handle(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Tear the bridge down and hand the host back to its owner.
    ///
    /// Buffered messages that never reached a ready destination are discarded.
    pub fn shutdown(mut self) -> H {
        let discarded = self.queue.drain_in_order();
        if !discarded.is_empty() {
            courier_warn!(
                context = self.log_context(),
                "shutting down with {} undelivered messages",
                discarded.len()
            );
            for entry in &discarded {
                log_message(MessageDirection::Dropped, entry.sequence, &entry.message);
                self.tally.dropped();
            }
        }
        self.tally.pending_depth(0);
        self.bindings.release_all();
        self.host
    }

    /// Whether the destination is ready.
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Destination lifetime counter.
    pub fn epoch(&self) -> u64 {
        self.gate.epoch()
    }

    /// Number of buffered messages.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Identifier of the active binding.
    pub fn active_binding(&self) -> Option<BindingId> {
        self.bindings.active_id()
    }

    /// Identifier of the binding waiting for readiness.
    pub fn pending_binding(&self) -> Option<BindingId> {
        self.bindings.pending_id()
    }

    /// Destination label.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Current counters.
    pub fn metrics(&self) -> BridgeMetrics {
        BridgeMetrics {
            bindings_activated: self.bindings.activations(),
            bindings_released: self.bindings.releases(),
            pending_peak: u64::try_from(self.queue.peak_len()).unwrap_or(u64::MAX),
            ..self.tally.counts
        }
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The destination host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the destination host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn on_readiness_transition(&mut self) -> Result<()> {
        if let Some(id) = self.bindings.on_ready() {
            log_lifecycle_event(
                Some(&self.log_context().with_binding(id.get())),
                "bridge.bind",
                "pending binding promoted",
                LifecycleOutcome::Applied,
            );
        }

        let drained = self.queue.drain_in_order();
        self.depth_warned = false;
        self.tally.pending_depth(0);
        let replay_count = drained.len();

        let mut first_failure = None;
        for entry in drained {
            if let Err(err) = self.deliver(entry, true) {
                first_failure.get_or_insert(err);
            }
        }
        if replay_count > 0 {
            courier_info!(
                context = self.log_context(),
                "replayed {replay_count} buffered messages"
            );
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn buffer(&mut self, entry: Sequenced) {
        log_message(MessageDirection::Buffered, entry.sequence, &entry.message);
        let depth = self.queue.enqueue(entry);
        self.tally.buffered(depth, self.queue.peak_len());
        if depth >= self.pending_warn_threshold && !self.depth_warned {
            self.depth_warned = true;
            self.tally.depth_warning();
            let oldest = self.queue.oldest_sequence().unwrap_or_default();
            courier_warn!(
                context = self.log_context(),
                "{depth} messages buffered while destination is not ready, oldest is {oldest}"
            );
        }
    }

    fn deliver(&mut self, entry: Sequenced, replayed: bool) -> Result<()> {
        let Sequenced { sequence, message } = entry;
        let ctx = LogContext::new()
            .with_destination(&self.destination)
            .with_channel(message.channel())
            .with_epoch(self.gate.epoch());

        let Some(context) = self.host.current_context() else {
            courier_warn!(
                context = ctx,
                "destination context missing, dropping message {sequence}"
            );
            log_message(MessageDirection::Dropped, sequence, &message);
            self.tally.dropped();
            return Ok(());
        };

        if !context.has_entry_point() {
            courier_error!(
                context = ctx,
                "destination entry point missing, dropping message {sequence}"
            );
            log_message(MessageDirection::Dropped, sequence, &message);
            self.tally.dropped();
            return Ok(());
        }

        let payload = match self.codec.project(message.payload(), context) {
            Ok(value) => value,
            Err(source) => {
                courier_error!(
                    context = ctx,
                    "payload of message {sequence} could not be projected: {source}"
                );
                self.tally.codec_failure();
                return Err(BridgeError::Codec {
                    sequence,
                    channel: message.channel().to_owned(),
                    source,
                });
            }
        };
        let ports = message
            .ports()
            .iter()
            .map(|port| self.codec.entangle(*port, context))
            .collect::<Vec<_>>();

        context.on_message(
            message.internal(),
            message.channel(),
            ports,
            payload,
            message.sender_id(),
        );

        let direction = if replayed {
            MessageDirection::Replayed
        } else {
            MessageDirection::Delivered
        };
        log_message(direction, sequence, &message);
        self.tally.delivered(&message, replayed);

        let receipt = DeliveryReceipt {
            sequence,
            message_id: message.id(),
            channel: message.channel().to_owned(),
            replayed,
        };
        if !self.bindings.acknowledge(&receipt) {
            courier_debug!(
                context = ctx,
                "no active binding, receipt for message {sequence} skipped"
            );
        }
        Ok(())
    }

    fn log_context(&self) -> LogContext<'_> {
        LogContext::new()
            .with_destination(&self.destination)
            .with_epoch(self.gate.epoch())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::{JsonCodec, PayloadEncoder};
    use crate::recording::{RecordingDestination, RecordingHost};
    use crate::types::{PortHandle, NO_SENDER};

    type TestBridge = BridgeService<RecordingHost, JsonCodec>;

    fn bridge() -> TestBridge {
        BridgeService::new("test-frame", RecordingHost::with_context(), JsonCodec)
    }

    fn message(channel: &str, value: serde_json::Value, sender_id: i32) -> Message {
        let payload = JsonCodec.encode(&value).expect("encode payload");
        Message::new(false, channel, payload, sender_id)
    }

    #[test]
    fn buffered_message_is_delivered_once_on_readiness() {
        let mut bridge = bridge();
        bridge
            .on_message(message("ping", json!("x"), 5))
            .expect("buffer");
        assert!(bridge.host().deliveries().is_empty());
        assert_eq!(bridge.pending_len(), 1);

        bridge.context_created().expect("ready");
        let deliveries = bridge.host().deliveries();
        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].internal);
        assert_eq!(deliveries[0].channel, "ping");
        assert!(deliveries[0].ports.is_empty());
        assert_eq!(deliveries[0].payload, json!("x"));
        assert_eq!(deliveries[0].sender_id, 5);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[test]
    fn sequences_follow_arrival_order() {
        let mut bridge = bridge();
        let first = bridge.on_message(message("a", json!(1), 1)).expect("a");
        bridge.context_created().expect("ready");
        let second = bridge.on_message(message("b", json!(2), 1)).expect("b");
        assert_eq!((first, second), (1, 2));
        let metrics = bridge.metrics();
        assert_eq!(metrics.received, 2);
        assert_eq!(metrics.buffered, 1);
        assert_eq!(metrics.replayed, 1);
        assert_eq!(metrics.delivered, 1);
    }

    #[test]
    fn missing_context_drops_live_message() {
        let mut bridge: TestBridge =
            BridgeService::new("gone", RecordingHost::default(), JsonCodec);
        bridge.context_created().expect("ready");
        bridge
            .on_message(message("ping", json!(null), NO_SENDER))
            .expect("drop is not an error");
        assert_eq!(bridge.metrics().dropped, 1);
    }

    #[test]
    fn missing_entry_point_drops_message() {
        let host = RecordingHost::with_destination(RecordingDestination::without_entry_point());
        let mut bridge: TestBridge = BridgeService::new("frame", host, JsonCodec);
        bridge.context_created().expect("ready");
        bridge
            .on_message(message("ping", json!(1), 2))
            .expect("drop is not an error");
        assert_eq!(bridge.metrics().dropped, 1);
        assert!(bridge.host().deliveries().is_empty());
    }

    #[test]
    fn codec_failure_is_reported_to_caller() {
        let mut bridge = bridge();
        bridge.context_created().expect("ready");
        let err = bridge
            .on_message(Message::new(false, "broken", "{oops", 3))
            .expect_err("codec failure surfaces");
        assert!(matches!(
            err,
            BridgeError::Codec { sequence: 1, ref channel, .. } if channel == "broken"
        ));
        assert_eq!(bridge.metrics().codec_failures, 1);
    }

    #[test]
    fn codec_failure_during_replay_does_not_block_later_messages() {
        let mut bridge = bridge();
        bridge.on_message(message("first", json!(1), 1)).expect("buffer");
        bridge
            .on_message(Message::new(false, "broken", "{oops", 1))
            .expect("buffer");
        bridge.on_message(message("third", json!(3), 1)).expect("buffer");

        assert!(bridge.context_created().is_err());
        assert_eq!(bridge.pending_len(), 0);
        let channels = bridge
            .host()
            .context()
            .map(RecordingDestination::channels)
            .unwrap_or_default();
        assert_eq!(channels, vec!["first", "third"]);
    }

    #[test]
    fn post_message_ports_are_entangled_in_order() {
        let mut bridge = bridge();
        bridge.context_created().expect("ready");
        let payload = JsonCodec.encode(&json!({"k": "v"})).expect("encode");
        bridge
            .on_post_message(
                "port",
                TransferableMessage::new(payload, vec![PortHandle::new(2), PortHandle::new(1)]),
            )
            .expect("deliver");
        let delivery = &bridge.host().deliveries()[0];
        assert_eq!(delivery.ports, vec![PortHandle::new(2), PortHandle::new(1)]);
        assert_eq!(delivery.sender_id, NO_SENDER);
        assert!(!delivery.internal);
    }

    #[test]
    fn user_activation_bypasses_gate() {
        let mut bridge = bridge();
        bridge.notify_user_activation();
        assert_eq!(
            bridge.host().context().map(RecordingDestination::user_activations),
            Some(1)
        );
        assert_eq!(bridge.pending_len(), 0);

        let mut detached: TestBridge =
            BridgeService::new("none", RecordingHost::default(), JsonCodec);
        detached.notify_user_activation();
    }

    #[test]
    fn shutdown_discards_buffered_messages() {
        let mut bridge = bridge();
        bridge.on_message(message("late", json!(0), 1)).expect("buffer");
        let host = bridge.shutdown();
        assert!(host.deliveries().is_empty());
    }

    #[test]
    fn depth_warning_fires_once_per_crossing_and_rearms_after_drain() {
        let config = BridgeConfig {
            destination: "warn-frame".into(),
            pending_warn_threshold: 2,
            ..BridgeConfig::default()
        };
        let mut bridge: TestBridge =
            BridgeService::from_config(&config, RecordingHost::with_context(), JsonCodec);

        for value in 0..5 {
            bridge.on_message(message("early", json!(value), 1)).expect("buffer");
        }
        assert_eq!(bridge.metrics().depth_warnings, 1, "one warning per not-ready window");

        bridge.context_created().expect("ready");
        bridge.context_destroyed();
        bridge.on_message(message("late", json!(0), 1)).expect("buffer");
        assert_eq!(bridge.metrics().depth_warnings, 1, "below threshold again");
        bridge.on_message(message("late", json!(1), 1)).expect("buffer");
        bridge.on_message(message("late", json!(2), 1)).expect("buffer");
        assert_eq!(bridge.metrics().depth_warnings, 2, "drain re-arms the warning");

        let metrics = bridge.metrics();
        assert_eq!(metrics.pending_peak, 5);
        assert_eq!(metrics.buffered, 8);
    }

    #[test]
    fn failed_drain_still_empties_queue_and_reports_error() {
        let mut bridge = bridge();
        bridge
            .on_message(Message::new(false, "broken", "{oops", 1))
            .expect("buffer");
        let err = bridge.context_created().expect_err("drain reports the codec failure");
        assert!(matches!(err, BridgeError::Codec { sequence: 1, .. }));
        assert!(bridge.is_ready());
        assert_eq!(bridge.pending_len(), 0);
        assert!(bridge.context_created().is_ok(), "second readiness signal is a no-op");
    }

    #[test]
    fn metrics_exporter_tracks_pending_depth() {
        let registry = prometheus::Registry::new();
        let exporter =
            BridgeMetricsExporter::register(&registry, "test-frame").expect("register exporter");
        let mut bridge = bridge().with_metrics_exporter(exporter);
        bridge.on_message(message("a", json!(1), 1)).expect("buffer");
        bridge.on_message(message("b", json!(2), 1)).expect("buffer");

        let depth = |registry: &prometheus::Registry| {
            registry
                .gather()
                .iter()
                .find(|family| family.get_name() == "courier_pending_depth")
                .map(|family| family.get_metric()[0].get_gauge().get_value())
        };
        assert_eq!(depth(&registry), Some(2.0));
        bridge.context_created().expect("ready");
        assert_eq!(depth(&registry), Some(0.0));
        assert_eq!(bridge.metrics().pending_peak, 2);
    }
}
