//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Channel binding ownership and rebinding."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_common::BindingResetPolicy;

use crate::types::DeliveryReceipt;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to every channel-bind request when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    /// Allocate the next process-wide identifier.
    pub fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Why a binding was released by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// A newer binding took over the active slot.
    Replaced,
    /// A newer bind request overwrote it while it was still pending.
    Superseded,
    /// The remote end closed the channel.
    Disconnected,
    /// The destination context was replaced and the reset policy dropped it.
    Reset,
    /// The bridge shut down.
    Shutdown,
}

/// Communication handle owned by the [`BindingManager`].
pub trait ChannelBinding: Send + fmt::Debug {
    /// Called after each successful delivery while this binding is active.
    fn on_delivered(&mut self, _receipt: &DeliveryReceipt) {}

    /// Teardown handler, invoked exactly once when the manager lets go of the binding.
    fn release(&mut self, _reason: ReleaseReason) {}
}

/// An inbound channel-bind request.
#[derive(Debug)]
pub struct BindRequest {
    id: BindingId,
    binding: Box<dyn ChannelBinding>,
}

impl BindRequest {
    /// Wrap a binding, allocating its identifier up front so the transport can
    /// later name it in a disconnect notification.
    pub fn new(binding: impl ChannelBinding + 'static) -> Self {
        Self {
            id: BindingId::next(),
            binding: Box::new(binding),
        }
    }

    /// Identifier of the requested binding.
    pub fn id(&self) -> BindingId {
        self.id
    }
}

/// Result of [`BindingManager::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Installed as the active binding; `released` is the binding it replaced.
    Activated {
        /// The newly active binding.
        id: BindingId,
        /// The binding that was active before, now released.
        released: Option<BindingId>,
    },
    /// Parked until readiness; `superseded` is the pending binding it overwrote.
    Deferred {
        /// The binding now waiting for readiness.
        id: BindingId,
        /// The previously pending binding, now released.
        superseded: Option<BindingId>,
    },
}

/// Result of [`BindingManager::on_disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The active binding was released.
    ReleasedActive,
    /// The named binding was still pending and has been discarded.
    DiscardedPending,
    /// The named binding is no longer held; nothing changed.
    Stale,
}

/// Owns the single active binding plus at most one binding waiting for readiness.
#[derive(Debug, Default)]
pub struct BindingManager {
    active: Option<BindRequest>,
    pending: Option<BindRequest>,
    activations: u64,
    releases: u64,
}

impl BindingManager {
    /// Create a manager holding no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a channel-bind request.
    ///
    /// With a ready destination the request replaces the active binding at
    /// once. Otherwise it overwrites the pending slot.
    pub fn bind(&mut self, request: BindRequest, destination_ready: bool) -> BindOutcome {
        let id = request.id;
        if destination_ready {
            let released = self.release_active(ReleaseReason::Replaced);
            self.activate(request);
            BindOutcome::Activated { id, released }
        } else {
            let superseded = self.release_pending(ReleaseReason::Superseded);
            self.pending = Some(request);
            BindOutcome::Deferred { id, superseded }
        }
    }

    /// Promote the pending binding, if any. Returns the promoted identifier.
    pub fn on_ready(&mut self) -> Option<BindingId> {
        let request = self.pending.take()?;
        let id = request.id;
        self.release_active(ReleaseReason::Replaced);
        self.activate(request);
        Some(id)
    }

    /// The remote end of binding `id` went away.
    pub fn on_disconnect(&mut self, id: BindingId) -> DisconnectOutcome {
        if self.active_id() == Some(id) {
            self.release_active(ReleaseReason::Disconnected);
            DisconnectOutcome::ReleasedActive
        } else if self.pending_id() == Some(id) {
            self.release_pending(ReleaseReason::Disconnected);
            DisconnectOutcome::DiscardedPending
        } else {
            DisconnectOutcome::Stale
        }
    }

    /// The destination context was replaced.
    ///
    /// Under [`BindingResetPolicy::Preserve`] the active binding is parked in the
    /// pending slot so the next readiness re-promotes it, unless a newer pending
    /// binding already waits there. Under [`BindingResetPolicy::Drop`] it is released.
    pub fn on_reset(&mut self, policy: BindingResetPolicy) {
        match policy {
            BindingResetPolicy::Preserve if self.pending.is_none() => {
                self.pending = self.active.take();
            }
            BindingResetPolicy::Preserve | BindingResetPolicy::Drop => {
                self.release_active(ReleaseReason::Reset);
            }
        }
    }

    /// Hand a delivery receipt to the active binding. Returns `false` when there is none.
    pub fn acknowledge(&mut self, receipt: &DeliveryReceipt) -> bool {
        match self.active.as_mut() {
            Some(active) => {
                active.binding.on_delivered(receipt);
                true
            }
            None => false,
        }
    }

    /// Release everything the manager holds.
    pub fn release_all(&mut self) {
        self.release_pending(ReleaseReason::Shutdown);
        self.release_active(ReleaseReason::Shutdown);
    }

    /// Identifier of the active binding.
    pub fn active_id(&self) -> Option<BindingId> {
        self.active.as_ref().map(|request| request.id)
    }

    /// Identifier of the binding waiting for readiness.
    pub fn pending_id(&self) -> Option<BindingId> {
        self.pending.as_ref().map(|request| request.id)
    }

    /// Number of bindings activated so far.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Number of bindings released so far.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    fn activate(&mut self, request: BindRequest) {
        self.activations += 1;
        self.active = Some(request);
    }

    fn release_active(&mut self, reason: ReleaseReason) -> Option<BindingId> {
        let mut request = self.active.take()?;
        request.binding.release(reason);
        self.releases += 1;
        Some(request.id)
    }

    fn release_pending(&mut self, reason: ReleaseReason) -> Option<BindingId> {
        let mut request = self.pending.take()?;
        request.binding.release(reason);
        self.releases += 1;
        Some(request.id)
    }
}
