//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Ordered buffer for messages received before readiness."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::collections::VecDeque;

use crate::Message;

/// A message stamped with the arrival sequence assigned by the bridge.
#[derive(Debug, PartialEq)]
pub struct Sequenced {
    /// Position in the bridge-wide arrival order.
    pub sequence: u64,
    /// The message itself.
    pub message: Message,
}

/// FIFO of messages awaiting destination readiness.
///
/// Growth is unbounded: nothing is ever evicted, so enqueue order is always
/// delivery order.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<Sequenced>,
    peak_len: usize,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and return the new length.
    pub fn enqueue(&mut self, entry: Sequenced) -> usize {
        self.entries.push_back(entry);
        self.peak_len = self.peak_len.max(self.entries.len());
        self.entries.len()
    }

    /// Remove and return every queued entry in enqueue order, leaving the queue empty.
    pub fn drain_in_order(&mut self) -> Vec<Sequenced> {
        std::mem::take(&mut self.entries).into()
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence of the oldest buffered entry.
    pub fn oldest_sequence(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.sequence)
    }

    /// Largest length observed. Survives drains.
    pub fn peak_len(&self) -> usize {
        self.peak_len
    }
}
