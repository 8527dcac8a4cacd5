//! Deferred height measurement.
//!
//! Layout reads are the expensive part of a pass, so items queue up here
//! and get measured in small slices on the `MeasureSlice` timer instead
//! of synchronously during event handling.

use indexmap::IndexSet;
use std::time::Duration;
use tracing::trace;

use chatfold_host::{HostPage, NodeId};

/// Items measured per slice.
pub const MEASURE_BATCH: usize = 8;

/// Delay before the next slice runs.
pub const MEASURE_SLICE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct MeasureQueue {
    queue: IndexSet<NodeId>,
}

impl MeasureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, node: NodeId) {
        self.queue.insert(node);
    }

    pub fn remove(&mut self, node: NodeId) {
        self.queue.shift_remove(&node);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Measure up to one batch from the front of the queue. Disconnected
    /// nodes are dropped; a node whose measurement fails transiently is
    /// requeued at the back for a later slice.
    pub fn run_slice<P: HostPage>(&mut self, page: &P) -> Vec<(NodeId, f64)> {
        let mut measured = Vec::new();
        for _ in 0..MEASURE_BATCH {
            let Some(node) = self.queue.shift_remove_index(0) else {
                break;
            };
            if !page.is_connected(node) {
                continue;
            }
            match page.measure_height(node) {
                Ok(height) => measured.push((node, height)),
                Err(err) => {
                    trace!(node = node.raw(), %err, "measurement failed, requeueing");
                    self.queue.insert(node);
                }
            }
        }
        measured
    }
}
