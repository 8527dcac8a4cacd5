//! Ordered membership index over the conversation's turns.
//!
//! The tracker mirrors the host document: which nodes are conversation
//! items, in what order, and what the engine knows about each. Most
//! updates are incremental from the change feed; anything it cannot
//! place incrementally sets the dirty flag and the next pass falls back
//! to a full rescan. The `revision` counter bumps on every membership
//! or order change so passes can skip work when nothing moved.

use indexmap::IndexMap;
use tracing::debug;

use chatfold_host::{HostPage, NodeId, SelectorFamily};

use crate::item::{ItemMeta, Materialization};

/// Result of feeding one added node from the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The node mapped to a new item container, now tracked.
    Added(NodeId),
    /// The node mapped to an item that was already tracked.
    AlreadyTracked(NodeId),
    /// The node does not belong to any item under the active family.
    Unmapped,
}

#[derive(Debug, Default)]
pub struct ItemTracker {
    /// Tracked items in document order.
    meta: IndexMap<NodeId, ItemMeta>,
    /// Family locked in by the last full rescan. All incremental
    /// normalization uses this family only.
    active_family: Option<SelectorFamily>,
    dirty: bool,
    revision: u64,
}

impl ItemTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn active_family(&self) -> Option<SelectorFamily> {
        self.active_family
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.meta.contains_key(&node)
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.meta.get_index_of(&node)
    }

    pub fn last(&self) -> Option<NodeId> {
        self.meta.keys().last().copied()
    }

    /// Tracked item ids in document order.
    pub fn items(&self) -> Vec<NodeId> {
        self.meta.keys().copied().collect()
    }

    pub fn meta(&self, node: NodeId) -> Option<&ItemMeta> {
        self.meta.get(&node)
    }

    pub fn meta_mut(&mut self, node: NodeId) -> Option<&mut ItemMeta> {
        self.meta.get_mut(&node)
    }

    /// Rebuild the whole index from the document.
    ///
    /// The first selector family with any match wins and becomes the
    /// active family. Meta for surviving items is preserved. Detached
    /// items are invisible to selector queries, so survivors in that
    /// state are merged back in at their placeholder's position;
    /// `anchor_of` maps an item to the node that marks its place in the
    /// document (the item itself while attached, its placeholder while
    /// detached).
    pub fn rebuild_full<P: HostPage>(&mut self, page: &P, anchor_of: impl Fn(NodeId) -> NodeId) {
        let family = SelectorFamily::PRIORITY
            .into_iter()
            .find(|f| !page.query_selector_all(*f).is_empty());
        let attached: Vec<NodeId> = family
            .map(|f| page.query_selector_all(f))
            .unwrap_or_default();

        let mut merged: Vec<(u64, NodeId)> = Vec::with_capacity(attached.len());
        for id in &attached {
            if let Some(pos) = page.document_position(*id) {
                merged.push((pos, *id));
            }
        }
        for (id, meta) in &self.meta {
            if meta.state == Materialization::CollapsedDetached && !attached.contains(id) {
                // Survives only while its placeholder still marks a spot.
                if let Some(pos) = page.document_position(anchor_of(*id)) {
                    merged.push((pos, *id));
                }
            }
        }
        merged.sort_by_key(|(pos, _)| *pos);

        let mut next: IndexMap<NodeId, ItemMeta> = IndexMap::with_capacity(merged.len());
        for (_, id) in merged {
            let meta = self.meta.get(&id).cloned().unwrap_or_default();
            next.insert(id, meta);
        }
        if !next.keys().eq(self.meta.keys()) {
            self.revision += 1;
            debug!(
                items = next.len(),
                revision = self.revision,
                family = ?family,
                "item index rebuilt"
            );
        }
        self.meta = next;
        self.active_family = family;
        self.dirty = false;
    }

    /// Map one added node from the change feed to its item container and
    /// insert it at its document position.
    pub fn add_candidate<P: HostPage>(
        &mut self,
        page: &P,
        node: NodeId,
        anchor_of: impl Fn(NodeId) -> NodeId,
    ) -> AddOutcome {
        let Some(family) = self.active_family else {
            // No family locked in yet; let the next rescan decide.
            self.dirty = true;
            return AddOutcome::Unmapped;
        };
        let Some(container) = page.closest_container(node, family) else {
            return AddOutcome::Unmapped;
        };
        if self.meta.contains_key(&container) {
            return AddOutcome::AlreadyTracked(container);
        }
        let Some(pos) = page.document_position(container) else {
            self.dirty = true;
            return AddOutcome::Unmapped;
        };
        let idx = self
            .meta
            .keys()
            .position(|k| page.document_position(anchor_of(*k)).is_some_and(|p| p > pos))
            .unwrap_or(self.meta.len());
        self.meta.shift_insert(idx, container, ItemMeta::default());
        self.revision += 1;
        AddOutcome::Added(container)
    }

    /// Drop a tracked item, returning its meta if it was known.
    pub fn remove_candidate(&mut self, node: NodeId) -> Option<ItemMeta> {
        let meta = self.meta.shift_remove(&node)?;
        self.revision += 1;
        Some(meta)
    }
}
