//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Per-message tracing and prometheus export."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use chrono::Utc;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use tracing::debug;

use crate::types::Message;

/// What happened to a message, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Parked in the pending queue.
    Buffered,
    /// Handed straight to a ready destination.
    Delivered,
    /// Handed to the destination while draining the pending queue.
    Replayed,
    /// Discarded because the destination could not take it.
    Dropped,
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, sequence: u64, message: &Message) {
    debug!(
        message_id = %message.id(),
        sequence,
        received_at = %message.received_at(),
        channel = message.channel(),
        internal = message.internal(),
        sender_id = message.sender_id(),
        ports = message.ports().len(),
        payload_bytes = message.payload().len(),
        direction = ?direction,
        "bridge message"
    );
}

/// Prometheus metric handles for one bridge.
#[derive(Debug, Clone)]
pub struct BridgeMetricsExporter {
    received: IntCounter,
    buffered: IntCounter,
    delivered: IntCounter,
    replayed: IntCounter,
    dropped: IntCounter,
    codec_failures: IntCounter,
    depth_warnings: IntCounter,
    pending_depth: IntGauge,
    pending_peak: IntGauge,
    buffered_wait: Histogram,
}

impl BridgeMetricsExporter {
    /// Register bridge metrics, labelled with `destination`, on the provided registry.
    pub fn register(registry: &Registry, destination: &str) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(name, help).const_label("destination", destination))
        };
        let received = counter(
            "courier_messages_received_total",
            "Messages handed to the bridge by the transport",
        )?;
        let buffered = counter(
            "courier_messages_buffered_total",
            "Messages parked until the destination became ready",
        )?;
        let delivered = counter(
            "courier_messages_delivered_total",
            "Messages delivered to a ready destination without buffering",
        )?;
        let replayed = counter(
            "courier_messages_replayed_total",
            "Buffered messages delivered while draining the pending queue",
        )?;
        let dropped = counter(
            "courier_messages_dropped_total",
            "Messages dropped because the destination context was gone",
        )?;
        let codec_failures = counter(
            "courier_codec_failures_total",
            "Payloads the codec could not project",
        )?;
        let depth_warnings = counter(
            "courier_pending_depth_warnings_total",
            "Times the pending queue crossed its warning threshold",
        )?;
        let gauge = |name: &str, help: &str| {
            IntGauge::with_opts(Opts::new(name, help).const_label("destination", destination))
        };
        let pending_depth = gauge("courier_pending_depth", "Messages currently buffered")?;
        let pending_peak = gauge(
            "courier_pending_peak",
            "Largest pending queue depth seen by this bridge",
        )?;
        let buffered_wait = Histogram::with_opts(
            HistogramOpts::new(
                "courier_buffered_wait_seconds",
                "Time buffered messages spent waiting for readiness",
            )
            .const_label("destination", destination),
        )?;

        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(buffered.clone()))?;
        registry.register(Box::new(delivered.clone()))?;
        registry.register(Box::new(replayed.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(codec_failures.clone()))?;
        registry.register(Box::new(depth_warnings.clone()))?;
        registry.register(Box::new(pending_depth.clone()))?;
        registry.register(Box::new(pending_peak.clone()))?;
        registry.register(Box::new(buffered_wait.clone()))?;

        Ok(Self {
            received,
            buffered,
            delivered,
            replayed,
            dropped,
            codec_failures,
            depth_warnings,
            pending_depth,
            pending_peak,
            buffered_wait,
        })
    }

    /// Record an inbound message.
    pub fn observe_received(&self) {
        self.received.inc();
    }

    /// Record a buffered message, the resulting queue depth and the peak depth so far.
    pub fn observe_buffered(&self, depth: usize, peak: usize) {
        self.buffered.inc();
        self.pending_depth.set(gauge_value(depth));
        self.pending_peak.set(gauge_value(peak));
    }

    /// Record the pending queue crossing its warning threshold.
    pub fn observe_depth_warning(&self) {
        self.depth_warnings.inc();
    }

    /// Record a live delivery.
    pub fn observe_delivered(&self) {
        self.delivered.inc();
    }

    /// Record a replayed delivery and how long the message waited.
    pub fn observe_replayed(&self, message: &Message) {
        self.replayed.inc();
        let waited = Utc::now().signed_duration_since(message.received_at());
        if let Ok(waited) = waited.to_std() {
            self.buffered_wait.observe(waited.as_secs_f64());
        }
    }

    /// Record a dropped message.
    pub fn observe_dropped(&self) {
        self.dropped.inc();
    }

    /// Record a codec failure.
    pub fn observe_codec_failure(&self) {
        self.codec_failures.inc();
    }

    /// Update the pending queue depth.
    pub fn set_pending_depth(&self, depth: usize) {
        self.pending_depth.set(gauge_value(depth));
    }
}

fn gauge_value(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
