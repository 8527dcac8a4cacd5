//! Keeps the host's visibility-observed set in step with the tracked
//! items. Each item is observed through its current position marker, so
//! a detached item's placeholder is watched in its stead.

use indexmap::IndexSet;

use chatfold_host::{HostPage, NodeId};

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    observed: IndexSet<NodeId>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_observed(&self, node: NodeId) -> bool {
        self.observed.contains(&node)
    }

    /// Make the observed set exactly `desired`, unobserving anything
    /// stale and observing anything new.
    pub fn reconcile<P: HostPage>(&mut self, page: &mut P, desired: &[NodeId]) {
        let desired: IndexSet<NodeId> = desired.iter().copied().collect();
        let stale: Vec<NodeId> = self.observed.difference(&desired).copied().collect();
        for node in stale {
            page.unobserve(node);
            self.observed.shift_remove(&node);
        }
        for node in desired {
            if self.observed.insert(node) {
                page.observe(node);
            }
        }
    }

    pub fn forget<P: HostPage>(&mut self, page: &mut P, node: NodeId) {
        if self.observed.shift_remove(&node) {
            page.unobserve(node);
        }
    }

    pub fn clear<P: HostPage>(&mut self, page: &mut P) {
        for node in self.observed.drain(..) {
            page.unobserve(node);
        }
    }
}
