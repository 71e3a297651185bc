//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Destination context entry point and host accessor."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use crate::types::SenderId;

/// The receiving execution context.
///
/// Implementors route by `channel` and `internal`. Errors raised while
/// handling a message stay inside the destination.
pub trait Destination {
    /// Native value the payload is projected into.
    type Value;
    /// Native object an auxiliary channel handle is entangled into.
    type Port;

    /// Whether the message entry point has been registered yet.
    fn has_entry_point(&self) -> bool {
        true
    }

    /// Message entry point.
    fn on_message(
        &mut self,
        internal: bool,
        channel: &str,
        ports: Vec<Self::Port>,
        payload: Self::Value,
        sender_id: SenderId,
    );

    /// Payload-less notification that user activation occurred.
    fn notify_user_activation(&mut self);
}

/// Locates the current destination context at delivery time.
///
/// The bridge never owns the context; the host returns `None` once the
/// context has gone away.
pub trait DestinationHost {
    /// Concrete destination type.
    type Context: Destination;

    /// The live context, if one exists.
    fn current_context(&mut self) -> Option<&mut Self::Context>;
}
