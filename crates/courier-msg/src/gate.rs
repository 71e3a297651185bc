//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Destination readiness tracking."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---

/// Tracks whether the destination context exists and can accept messages.
///
/// Readiness moves from `false` to `true` once per destination lifetime. The
/// only way back to `false` is [`ReadinessGate::reset`], which also starts a
/// new epoch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadinessGate {
    ready: bool,
    epoch: u64,
}

impl ReadinessGate {
    /// Create a gate in the not-ready state, epoch zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the destination ready.
    ///
    /// Returns `true` when this call performed the transition. Calling it again
    /// before a reset is a no-op that returns `false`.
    pub fn mark_ready(&mut self) -> bool {
        if self.ready {
            return false;
        }
        self.ready = true;
        true
    }

    /// Whether the destination can accept messages right now.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Return to not-ready for a replacement destination context and bump the epoch.
    pub fn reset(&mut self) -> u64 {
        self.ready = false;
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// Number of destination contexts replaced so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_ready_transitions_once() {
        let mut gate = ReadinessGate::new();
        assert!(!gate.is_ready());
        assert!(gate.mark_ready());
        assert!(gate.is_ready());
        assert!(!gate.mark_ready(), "second mark is a no-op");
        assert!(gate.is_ready());
    }

    #[test]
    fn reset_starts_new_epoch() {
        let mut gate = ReadinessGate::new();
        gate.mark_ready();
        assert_eq!(gate.reset(), 1);
        assert!(!gate.is_ready());
        assert!(gate.mark_ready(), "ready again after reset");
        assert_eq!(gate.epoch(), 1);
    }
}
