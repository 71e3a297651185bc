//! ---
//! courier_section: "03-logging"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Structured logging adapters and sinks."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Destination label the event relates to.
    pub destination: Option<&'a str>,
    /// Logical message channel.
    pub channel: Option<&'a str>,
    /// Channel binding identifier.
    pub binding: Option<u64>,
    /// Destination lifetime counter, bumped on every context reset.
    pub epoch: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a destination label.
    pub fn with_destination(mut self, destination: &'a str) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Attach a message channel.
    pub fn with_channel(mut self, channel: &'a str) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Attach a binding identifier.
    pub fn with_binding(mut self, binding: u64) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Attach the destination epoch.
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = Some(epoch);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The transition happened.
    Applied,
    /// The transition was ignored because it did not apply to the current state.
    Ignored,
    /// The transition failed.
    Fault,
}

impl LifecycleOutcome {
    /// Stable label used in the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Applied => "applied",
            LifecycleOutcome::Ignored => "ignored",
            LifecycleOutcome::Fault => "fault",
        }
    }

    /// Level the outcome is logged at.
    pub fn level(&self) -> Level {
        match self {
            LifecycleOutcome::Applied => Level::INFO,
            LifecycleOutcome::Ignored => Level::DEBUG,
            LifecycleOutcome::Fault => Level::ERROR,
        }
    }
}

/// Emit a standardized lifecycle event (readiness, reset, bind, disconnect, drain).
///
/// The event is logged at [`LifecycleOutcome::level`].
pub fn log_lifecycle_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                event,
                outcome = outcome.as_str(),
                destination = ctx.destination.unwrap_or(""),
                channel = ctx.channel.unwrap_or(""),
                binding = ctx.binding.unwrap_or_default(),
                epoch = ctx.epoch.unwrap_or_default(),
                message = %message
            )
        };
    }
    match outcome.level() {
        Level::ERROR => emit!(Level::ERROR),
        Level::WARN => emit!(Level::WARN),
        Level::INFO => emit!(Level::INFO),
        Level::DEBUG => emit!(Level::DEBUG),
        _ => emit!(Level::TRACE),
    }
}
