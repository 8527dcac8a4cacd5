//! Collapse and expand of individual conversation turns.
//!
//! Two policies. Strict blanks the item's content in place and parks a
//! fixed-height placeholder inside it, so the item node itself never
//! leaves the document. Detached removes the whole node and leaves a
//! zero-height placeholder marking where it belongs, compensating the
//! scroll offset so the viewport does not shift.
//!
//! Restoration tokens are held here, keyed by item. Losing a token loses
//! content, so every operation validates its preconditions before
//! consuming one, and partial failures roll back.

use indexmap::IndexMap;
use tracing::warn;

use chatfold_host::{ContentToken, DetachedNode, HostError, HostPage, NodeId, PlaceholderSpec};

use crate::anchor::{insertion_compensation, removal_compensation};

#[derive(Debug, Default)]
pub struct CollapseEngine {
    /// item -> placeholder
    placeholders: IndexMap<NodeId, NodeId>,
    /// placeholder -> item
    by_placeholder: IndexMap<NodeId, NodeId>,
    /// Restoration tokens for strict-collapsed items.
    strict_tokens: IndexMap<NodeId, ContentToken>,
    /// Owned subtrees of detached items.
    detached_nodes: IndexMap<NodeId, DetachedNode>,
}

impl CollapseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collapsed_count(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_collapsed(&self, item: NodeId) -> bool {
        self.placeholders.contains_key(&item)
    }

    pub fn is_detached(&self, item: NodeId) -> bool {
        self.detached_nodes.contains_key(&item)
    }

    pub fn owns_placeholder(&self, node: NodeId) -> bool {
        self.by_placeholder.contains_key(&node)
    }

    pub fn item_for_placeholder(&self, placeholder: NodeId) -> Option<NodeId> {
        self.by_placeholder.get(&placeholder).copied()
    }

    pub fn placeholder_of(&self, item: NodeId) -> Option<NodeId> {
        self.placeholders.get(&item).copied()
    }

    /// Collapsed items, oldest collapse first.
    pub fn collapsed_items(&self) -> Vec<NodeId> {
        self.placeholders.keys().copied().collect()
    }

    /// Detached items, oldest collapse first.
    pub fn detached_items(&self) -> Vec<NodeId> {
        self.detached_nodes.keys().copied().collect()
    }

    /// The node that marks the item's place in the document: the item
    /// itself while attached, its placeholder while detached.
    pub fn anchor_node(&self, item: NodeId) -> NodeId {
        if self.detached_nodes.contains_key(&item) {
            self.placeholders.get(&item).copied().unwrap_or(item)
        } else {
            item
        }
    }

    /// Blank the item in place, reserving its measured height with a
    /// placeholder inside it. Idempotent for already-collapsed items.
    pub fn collapse_strict<P: HostPage>(
        &mut self,
        page: &mut P,
        item: NodeId,
        reserved_height: f64,
        affordance: bool,
    ) -> Result<(), HostError> {
        if self.placeholders.contains_key(&item) {
            return Ok(());
        }
        let token = page.blank_content(item)?;
        let spec = PlaceholderSpec::strict(reserved_height, affordance);
        let placeholder = match page.insert_placeholder_into(item, &spec) {
            Ok(placeholder) => placeholder,
            Err(err) => {
                if let Err(restore_err) = page.restore_content(item, token) {
                    warn!(item = item.raw(), %restore_err, "rollback restore failed");
                }
                return Err(err);
            }
        };
        self.placeholders.insert(item, placeholder);
        self.by_placeholder.insert(placeholder, item);
        self.strict_tokens.insert(item, token);
        Ok(())
    }

    /// Remove the item from the document, leaving a zero-height
    /// placeholder at its position, and compensate the scroll offset for
    /// the removed height. Idempotent for already-collapsed items.
    pub fn collapse_detached<P: HostPage>(
        &mut self,
        page: &mut P,
        item: NodeId,
        height: f64,
    ) -> Result<(), HostError> {
        if self.placeholders.contains_key(&item) {
            return Ok(());
        }
        let top = page.offset_top(item);
        let scroll = page.scroll_top();
        let placeholder = page.insert_placeholder_before(item, &PlaceholderSpec::detached())?;
        let detached = match page.detach_node(item) {
            Ok(detached) => detached,
            Err(err) => {
                if let Err(remove_err) = page.remove_node(placeholder) {
                    warn!(item = item.raw(), %remove_err, "rollback placeholder removal failed");
                }
                return Err(err);
            }
        };
        self.placeholders.insert(item, placeholder);
        self.by_placeholder.insert(placeholder, item);
        self.detached_nodes.insert(item, detached);

        if let Some(top) = top
            && let Some(delta) = removal_compensation(top, height, scroll)
            && let Err(err) = page.scroll_by(delta)
        {
            warn!(item = item.raw(), %err, "scroll compensation failed");
        }
        Ok(())
    }

    /// Restore a collapsed item. Returns false when the item was not
    /// collapsed. For detached items whose placeholder has vanished,
    /// `fallback_anchor` (the next item's position marker) is used as
    /// the reinsertion point.
    pub fn expand<P: HostPage>(
        &mut self,
        page: &mut P,
        item: NodeId,
        fallback_anchor: Option<NodeId>,
    ) -> Result<bool, HostError> {
        if self.detached_nodes.contains_key(&item) {
            let placeholder = self.placeholders.get(&item).copied();
            let anchor = placeholder
                .filter(|p| page.is_connected(*p))
                .or_else(|| fallback_anchor.filter(|a| page.is_connected(*a)))
                .ok_or(HostError::NotConnected(item))?;
            let anchor_top = page.offset_top(anchor);
            let scroll = page.scroll_top();

            let Some(detached) = self.detached_nodes.shift_remove(&item) else {
                return Ok(false);
            };
            self.clear_records(item);
            page.reattach_before(anchor, detached)?;
            if let Some(placeholder) = placeholder
                && page.is_connected(placeholder)
                && let Err(err) = page.remove_node(placeholder)
            {
                warn!(item = item.raw(), %err, "placeholder removal failed");
            }

            let height = page.measure_height(item).ok();
            if let (Some(top), Some(height)) = (anchor_top, height)
                && let Some(delta) = insertion_compensation(top, height, scroll)
                && let Err(err) = page.scroll_by(delta)
            {
                warn!(item = item.raw(), %err, "scroll compensation failed");
            }
            return Ok(true);
        }

        if self.strict_tokens.contains_key(&item) {
            if !page.is_connected(item) {
                self.strict_tokens.shift_remove(&item);
                self.clear_records(item);
                return Err(HostError::NotConnected(item));
            }
            let placeholder = self.clear_records(item);
            if let Some(placeholder) = placeholder
                && let Err(err) = page.remove_node(placeholder)
            {
                warn!(item = item.raw(), %err, "placeholder removal failed");
            }
            if let Some(token) = self.strict_tokens.shift_remove(&item) {
                page.restore_content(item, token)?;
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Drop all records for an item without restoring content, removing
    /// its placeholder if one is still in the document. Used when the
    /// host has destroyed the item out from under the engine.
    pub fn discard<P: HostPage>(&mut self, page: &mut P, item: NodeId) {
        self.strict_tokens.shift_remove(&item);
        self.detached_nodes.shift_remove(&item);
        if let Some(placeholder) = self.clear_records(item)
            && page.is_connected(placeholder)
            && let Err(err) = page.remove_node(placeholder)
        {
            warn!(item = item.raw(), %err, "orphan placeholder removal failed");
        }
    }

    fn clear_records(&mut self, item: NodeId) -> Option<NodeId> {
        let placeholder = self.placeholders.shift_remove(&item);
        if let Some(placeholder) = placeholder {
            self.by_placeholder.shift_remove(&placeholder);
        }
        placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatfold_host::{SimPage, TurnSpec};

    fn ten_turns(page: &mut SimPage) -> Vec<NodeId> {
        (0..10)
            .map(|i| page.append_turn(&TurnSpec::new(100.0, format!("turn {i}"))))
            .collect()
    }

    #[test]
    fn strict_collapse_reserves_height_and_restores_identically() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();
        let before = page.content_signature(ids[0]);

        engine
            .collapse_strict(&mut page, ids[0], 100.0, true)
            .unwrap();
        assert!(engine.is_collapsed(ids[0]));
        assert!(!engine.is_detached(ids[0]));
        assert_eq!(page.content_height(), 1000.0, "height is reserved");
        assert!(page.is_connected(ids[0]), "node itself stays put");

        assert!(engine.expand(&mut page, ids[0], None).unwrap());
        assert_eq!(page.content_signature(ids[0]), before);
        assert_eq!(engine.collapsed_count(), 0);
    }

    #[test]
    fn detached_collapse_above_viewport_keeps_view_stable() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        page.scroll_to(700.0);
        let visible_before = page.visible_texts();
        let mut engine = CollapseEngine::new();

        engine.collapse_detached(&mut page, ids[0], 100.0).unwrap();
        assert!(!page.is_connected(ids[0]));
        assert_eq!(page.scroll_top(), 600.0, "compensated by removed height");
        assert_eq!(page.visible_texts(), visible_before);

        assert!(engine.expand(&mut page, ids[0], None).unwrap());
        assert_eq!(page.scroll_top(), 700.0);
        assert_eq!(page.visible_texts(), visible_before);
        assert_eq!(page.list_children()[0], ids[0], "position restored");
    }

    #[test]
    fn detached_collapse_below_viewport_needs_no_compensation() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        page.scroll_to(0.0);
        let mut engine = CollapseEngine::new();

        engine.collapse_detached(&mut page, ids[9], 100.0).unwrap();
        assert_eq!(page.scroll_top(), 0.0);
        engine.expand(&mut page, ids[9], None).unwrap();
        assert_eq!(page.scroll_top(), 0.0);
    }

    #[test]
    fn expand_uses_fallback_anchor_when_placeholder_vanished() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();

        engine.collapse_detached(&mut page, ids[3], 100.0).unwrap();
        let ph = engine.placeholder_of(ids[3]).unwrap();
        // Host wipes the placeholder (framework re-render).
        page.remove_turn(ph);

        assert!(engine.expand(&mut page, ids[3], Some(ids[4])).unwrap());
        let children = page.list_children();
        let at = children.iter().position(|c| *c == ids[3]).unwrap();
        assert_eq!(children[at + 1], ids[4], "reinserted before its successor");
    }

    #[test]
    fn expand_without_any_anchor_fails_and_preserves_token() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();

        engine.collapse_detached(&mut page, ids[3], 100.0).unwrap();
        let ph = engine.placeholder_of(ids[3]).unwrap();
        page.remove_turn(ph);

        assert!(engine.expand(&mut page, ids[3], None).is_err());
        assert!(engine.is_detached(ids[3]), "token not consumed");
        assert!(engine.expand(&mut page, ids[3], Some(ids[4])).unwrap());
    }

    #[test]
    fn expand_of_expanded_item_is_a_noop() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();
        assert!(!engine.expand(&mut page, ids[0], None).unwrap());
    }

    #[test]
    fn anchor_node_switches_to_placeholder_while_detached() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();

        assert_eq!(engine.anchor_node(ids[2]), ids[2]);
        engine.collapse_detached(&mut page, ids[2], 100.0).unwrap();
        let ph = engine.placeholder_of(ids[2]).unwrap();
        assert_eq!(engine.anchor_node(ids[2]), ph);
        assert!(engine.owns_placeholder(ph));
        assert_eq!(engine.item_for_placeholder(ph), Some(ids[2]));
    }

    #[test]
    fn discard_drops_records_and_orphan_placeholder() {
        let mut page = SimPage::new(300.0);
        let ids = ten_turns(&mut page);
        let mut engine = CollapseEngine::new();

        engine.collapse_detached(&mut page, ids[1], 100.0).unwrap();
        let ph = engine.placeholder_of(ids[1]).unwrap();
        engine.discard(&mut page, ids[1]);
        assert_eq!(engine.collapsed_count(), 0);
        assert!(!page.is_connected(ph));
    }
}
