//! SimPage - deterministic in-memory chat document implementing [`HostPage`].
//!
//! The layout model is a vertical stack: each turn contributes its
//! effective height, placeholders contribute their reserved height, and
//! detached turns contribute nothing. Mutations and visibility changes
//! are recorded the way a MutationObserver / IntersectionObserver pair
//! would report them, then drained by the driver.

use indexmap::IndexMap;

use crate::error::HostError;
use crate::node::{
    Marker, MutationBatch, NodeId, PlaceholderSpec, SelectorFamily, VisibilityEvent,
};
use crate::page::HostPage;

#[derive(Debug, Clone)]
struct SimNode {
    tag: String,
    attrs: IndexMap<String, String>,
    classes: Vec<String>,
    markers: Vec<Marker>,
    text: String,
    /// Intrinsic rendered height when the node's own content is live
    height: f64,
    /// Strict collapse: content removed, node kept
    blanked: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SimNode {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: IndexMap::new(),
            classes: Vec::new(),
            markers: Vec::new(),
            text: String::new(),
            height: 0.0,
            blanked: false,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Opaque token holding content captured by [`HostPage::blank_content`].
#[derive(Debug)]
pub struct ContentToken {
    owner: NodeId,
    text: String,
    children: Vec<NodeId>,
    subtree: Vec<(NodeId, SimNode)>,
}

/// Opaque token holding a subtree removed by [`HostPage::detach_node`].
#[derive(Debug)]
pub struct DetachedNode {
    root: NodeId,
    subtree: Vec<(NodeId, SimNode)>,
}

impl DetachedNode {
    /// Id the subtree will have again once reattached.
    pub fn root_id(&self) -> NodeId {
        self.root
    }
}

/// Description of a conversation turn to append to a [`SimPage`].
#[derive(Debug, Clone)]
pub struct TurnSpec {
    pub height: f64,
    pub text: String,
    pub status: Option<String>,
    pub streaming_flag: bool,
    pub busy: bool,
    pub spinner: bool,
    pub family: SelectorFamily,
}

impl TurnSpec {
    pub fn new(height: f64, text: impl Into<String>) -> Self {
        Self {
            height,
            text: text.into(),
            status: None,
            streaming_flag: false,
            busy: false,
            spinner: false,
            family: SelectorFamily::TurnTestId,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming_flag = true;
        self
    }

    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }

    pub fn with_spinner(mut self) -> Self {
        self.spinner = true;
        self
    }

    pub fn in_family(mut self, family: SelectorFamily) -> Self {
        self.family = family;
        self
    }
}

/// In-memory host document: root → scroll container ("main") → turns.
#[derive(Debug)]
pub struct SimPage {
    nodes: IndexMap<NodeId, SimNode>,
    next_id: u64,
    root: NodeId,
    list: NodeId,
    scroll_top: f64,
    viewport_height: f64,
    observe_margin: f64,
    /// node → last reported intersection state
    observed: IndexMap<NodeId, bool>,
    pending_mutations: Vec<MutationBatch>,
    pending_visibility: Vec<VisibilityEvent>,
    /// Remaining measure calls to fail, for transient-failure tests
    fail_measures: std::cell::Cell<u32>,
}

impl SimPage {
    pub fn new(viewport_height: f64) -> Self {
        let mut page = Self {
            nodes: IndexMap::new(),
            next_id: 0,
            root: NodeId(0),
            list: NodeId(0),
            scroll_top: 0.0,
            viewport_height,
            observe_margin: viewport_height,
            observed: IndexMap::new(),
            pending_mutations: Vec::new(),
            pending_visibility: Vec::new(),
            fail_measures: std::cell::Cell::new(0),
        };
        let root = page.alloc(SimNode::element("html"));
        let mut list = SimNode::element("main");
        list.parent = Some(root);
        let list_id = page.alloc(list);
        if let Some(node) = page.nodes.get_mut(&root) {
            node.children.push(list_id);
        }
        page.root = root;
        page.list = list_id;
        page
    }

    /// Margin used for the near-viewport visibility threshold. Defaults
    /// to one viewport height.
    pub fn set_observe_margin(&mut self, margin: f64) {
        self.observe_margin = margin;
        self.recompute_visibility();
    }

    /// The scrolling container node.
    pub fn list_node(&self) -> NodeId {
        self.list
    }

    fn alloc(&mut self, node: SimNode) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    // --- content construction ---

    /// Append a turn at the end of the conversation.
    pub fn append_turn(&mut self, spec: &TurnSpec) -> NodeId {
        let len = self.turn_count();
        self.insert_turn_at(len, spec)
    }

    /// Insert a turn at an arbitrary position (out-of-order host insert).
    pub fn insert_turn_at(&mut self, index: usize, spec: &TurnSpec) -> NodeId {
        let mut node = SimNode::element("div");
        node.height = spec.height;
        node.text = spec.text.clone();
        node.parent = Some(self.list);
        match spec.family {
            SelectorFamily::TurnTestId => {
                node.attrs
                    .insert("data-testid".into(), "conversation-turn".into());
            }
            SelectorFamily::MessageId => {
                node.attrs
                    .insert("data-message-id".into(), format!("m{}", self.next_id + 1));
            }
            SelectorFamily::ListItemRole => {
                node.attrs.insert("role".into(), "listitem".into());
            }
            SelectorFamily::GroupFallback => {
                node.classes = vec!["group".into(), "w-full".into()];
            }
        }
        if let Some(status) = &spec.status {
            node.attrs.insert("data-message-status".into(), status.clone());
        }
        if spec.streaming_flag {
            node.attrs.insert("data-streaming".into(), "true".into());
        }
        if spec.busy {
            node.attrs.insert("aria-busy".into(), "true".into());
        }
        let id = self.alloc(node);

        if spec.spinner {
            let mut spinner = SimNode::element("span");
            spinner.markers.push(Marker::Spinner);
            spinner.parent = Some(id);
            let spinner_id = self.alloc(spinner);
            if let Some(turn) = self.nodes.get_mut(&id) {
                turn.children.push(spinner_id);
            }
        }

        let list = self.list;
        if let Some(list_node) = self.nodes.get_mut(&list) {
            let at = index.min(list_node.children.len());
            list_node.children.insert(at, id);
        }
        self.pending_mutations
            .push(MutationBatch::child_list(list, vec![id], Vec::new()));
        self.recompute_visibility();
        id
    }

    /// Host-side removal of a turn and its subtree.
    pub fn remove_turn(&mut self, id: NodeId) {
        if !self.nodes.contains_key(&id) {
            return;
        }
        self.unlink_from_parent(id);
        self.drop_subtree(id);
        let list = self.list;
        self.pending_mutations
            .push(MutationBatch::child_list(list, Vec::new(), vec![id]));
        self.recompute_visibility();
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attrs.insert(name.to_string(), value.to_string());
            self.pending_mutations.push(MutationBatch::attribute(id));
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attrs.shift_remove(name);
            self.pending_mutations.push(MutationBatch::attribute(id));
        }
    }

    /// Convenience for the turn status attribute the streaming detector
    /// reads.
    pub fn set_status(&mut self, id: NodeId, status: &str) {
        self.set_attribute(id, "data-message-status", status);
    }

    /// Streaming append: grows the turn's text and height.
    pub fn append_text(&mut self, id: NodeId, text: &str, grown_height: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text.push_str(text);
            node.height = node.height.max(grown_height);
            self.pending_mutations
                .push(MutationBatch::character_data(id));
            self.recompute_visibility();
        }
    }

    pub fn set_height(&mut self, id: NodeId, height: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.height = height;
            self.recompute_visibility();
        }
    }

    pub fn scroll_to(&mut self, top: f64) {
        let max = (self.content_height() - self.viewport_height).max(0.0);
        self.scroll_top = top.clamp(0.0, max);
        self.recompute_visibility();
    }

    /// Fail the next `n` measure_height calls, simulating layout not
    /// being ready.
    pub fn fail_next_measures(&mut self, n: u32) {
        self.fail_measures.set(n);
    }

    // --- test/driver observation helpers ---

    /// Current top-level children of the scroll container (turns and
    /// detached placeholders), in order.
    pub fn list_children(&self) -> Vec<NodeId> {
        self.nodes
            .get(&self.list)
            .map(|l| l.children.clone())
            .unwrap_or_default()
    }

    fn turn_count(&self) -> usize {
        self.list_children().len()
    }

    /// Total scrollable content height.
    pub fn content_height(&self) -> f64 {
        self.list_children()
            .iter()
            .map(|id| self.effective_height(*id))
            .sum()
    }

    /// Text of every turn whose box intersects the exact viewport (no
    /// margin), top to bottom. Zero-height boxes are excluded: the user
    /// cannot see them.
    pub fn visible_texts(&self) -> Vec<String> {
        let vmin = self.scroll_top;
        let vmax = self.scroll_top + self.viewport_height;
        let mut out = Vec::new();
        let mut top = 0.0;
        for id in self.list_children() {
            let h = self.effective_height(id);
            if h > 0.0 && top < vmax && top + h > vmin {
                out.push(self.text_excerpt(id, usize::MAX));
            }
            top += h;
        }
        out
    }

    /// Identity signature for round-trip assertions: concatenated text
    /// plus descendant count.
    pub fn content_signature(&self, id: NodeId) -> (String, usize) {
        let text = self.text_excerpt(id, usize::MAX);
        let mut count = 0usize;
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get(&cur) {
                count += node.children.len();
                stack.extend(node.children.iter().copied());
            }
        }
        (text, count)
    }

    // --- internals ---

    fn effective_height(&self, id: NodeId) -> f64 {
        let Some(node) = self.nodes.get(&id) else {
            return 0.0;
        };
        if node.blanked {
            node.children
                .iter()
                .map(|c| self.nodes.get(c).map_or(0.0, |n| n.height))
                .sum()
        } else {
            node.height
        }
    }

    fn unlink_from_parent(&mut self, id: NodeId) {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        if let Some(parent) = parent
            && let Some(parent_node) = self.nodes.get_mut(&parent)
        {
            parent_node.children.retain(|c| *c != id);
        }
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.shift_remove(&cur) {
                stack.extend(node.children);
            }
            self.observed.shift_remove(&cur);
        }
    }

    /// Move a subtree out of the node map, children first.
    fn extract_subtree(&mut self, roots: &[NodeId]) -> Vec<(NodeId, SimNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.shift_remove(&cur) {
                stack.extend(node.children.iter().copied());
                out.push((cur, node));
            }
            self.observed.shift_remove(&cur);
        }
        out
    }

    fn restore_subtree(&mut self, subtree: Vec<(NodeId, SimNode)>) {
        for (id, node) in subtree {
            self.nodes.insert(id, node);
        }
    }

    fn matches_family(&self, id: NodeId, family: SelectorFamily) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if node.attrs.contains_key("hidden") {
            return false;
        }
        match family {
            SelectorFamily::TurnTestId => {
                node.attrs.get("data-testid").map(String::as_str) == Some("conversation-turn")
            }
            SelectorFamily::MessageId => node.attrs.contains_key("data-message-id"),
            SelectorFamily::ListItemRole => {
                node.tag == "div" && node.attrs.get("role").map(String::as_str) == Some("listitem")
            }
            SelectorFamily::GroupFallback => {
                node.classes.iter().any(|c| c == "group")
                    && node.classes.iter().any(|c| c == "w-full")
            }
        }
    }

    fn dfs_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            if let Some(node) = self.nodes.get(&cur) {
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    fn intersects_margined(&self, id: NodeId) -> bool {
        let Some(top) = self.offset_top(id) else {
            return false;
        };
        let h = self.effective_height(id);
        let vmin = self.scroll_top - self.observe_margin;
        let vmax = self.scroll_top + self.viewport_height + self.observe_margin;
        top <= vmax && top + h >= vmin
    }

    fn recompute_visibility(&mut self) {
        let ids: Vec<NodeId> = self.observed.keys().copied().collect();
        for id in ids {
            if !self.is_connected(id) {
                self.observed.shift_remove(&id);
                continue;
            }
            let now = self.intersects_margined(id);
            let prev = self.observed.get(&id).copied().unwrap_or(false);
            if now != prev {
                self.observed.insert(id, now);
                self.pending_visibility.push(VisibilityEvent {
                    node: id,
                    entered: now,
                });
            }
        }
    }
}

impl HostPage for SimPage {
    fn query_selector_all(&self, family: SelectorFamily) -> Vec<NodeId> {
        self.dfs_order()
            .into_iter()
            .filter(|id| self.matches_family(*id, family))
            .collect()
    }

    fn closest_container(&self, node: NodeId, family: SelectorFamily) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if self.matches_family(id, family) {
                return Some(id);
            }
            cur = self.nodes.get(&id).and_then(|n| n.parent);
        }
        None
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == self.root {
                return true;
            }
            match self.nodes.get(&id) {
                Some(n) => cur = n.parent,
                None => return false,
            }
        }
        false
    }

    fn document_position(&self, node: NodeId) -> Option<u64> {
        if !self.is_connected(node) {
            return None;
        }
        self.dfs_order()
            .iter()
            .position(|id| *id == node)
            .map(|p| p as u64)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes.get(&node).and_then(|n| n.attrs.get(name).cloned())
    }

    fn has_marker(&self, node: NodeId, marker: Marker) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.markers.contains(&marker))
    }

    fn descendant_with_marker(&self, node: NodeId, marker: Marker) -> bool {
        let Some(root) = self.nodes.get(&node) else {
            return false;
        };
        let mut stack: Vec<NodeId> = root.children.clone();
        while let Some(cur) = stack.pop() {
            if let Some(n) = self.nodes.get(&cur) {
                if n.markers.contains(&marker) {
                    return true;
                }
                stack.extend(n.children.iter().copied());
            }
        }
        false
    }

    fn text_excerpt(&self, node: NodeId, limit: usize) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(cur) = stack.pop() {
            if let Some(n) = self.nodes.get(&cur) {
                out.push_str(&n.text);
                if out.chars().count() >= limit {
                    return out.chars().take(limit).collect();
                }
                for child in n.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    fn measure_height(&self, node: NodeId) -> Result<f64, HostError> {
        if !self.nodes.contains_key(&node) {
            return Err(HostError::UnknownNode(node));
        }
        if !self.is_connected(node) {
            return Err(HostError::NotConnected(node));
        }
        let remaining = self.fail_measures.get();
        if remaining > 0 {
            self.fail_measures.set(remaining - 1);
            return Err(HostError::InvalidOperation("layout not ready".into()));
        }
        Ok(self.effective_height(node))
    }

    fn offset_top(&self, node: NodeId) -> Option<f64> {
        if !self.is_connected(node) {
            return None;
        }
        // Walk up to the top-level child of the scroll container.
        let mut top_level = node;
        loop {
            let parent = self.nodes.get(&top_level).and_then(|n| n.parent)?;
            if parent == self.list {
                break;
            }
            top_level = parent;
        }
        let mut top = 0.0;
        for id in self.list_children() {
            if id == top_level {
                return Some(top);
            }
            top += self.effective_height(id);
        }
        None
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn scroll_by(&mut self, delta: f64) -> Result<(), HostError> {
        let max = (self.content_height() - self.viewport_height).max(0.0);
        self.scroll_top = (self.scroll_top + delta).clamp(0.0, max);
        self.recompute_visibility();
        Ok(())
    }

    fn blank_content(&mut self, node: NodeId) -> Result<ContentToken, HostError> {
        if !self.is_connected(node) {
            return Err(HostError::NotConnected(node));
        }
        let (text, children) = {
            let n = self
                .nodes
                .get_mut(&node)
                .ok_or(HostError::UnknownNode(node))?;
            if n.blanked {
                return Err(HostError::InvalidOperation(
                    "content already blanked".into(),
                ));
            }
            n.blanked = true;
            (std::mem::take(&mut n.text), std::mem::take(&mut n.children))
        };
        let subtree = self.extract_subtree(&children);
        self.pending_mutations
            .push(MutationBatch::child_list(node, Vec::new(), children.clone()));
        self.recompute_visibility();
        Ok(ContentToken {
            owner: node,
            text,
            children,
            subtree,
        })
    }

    fn restore_content(&mut self, node: NodeId, token: ContentToken) -> Result<(), HostError> {
        if token.owner != node {
            return Err(HostError::InvalidOperation(
                "content token belongs to a different node".into(),
            ));
        }
        if !self.nodes.contains_key(&node) {
            return Err(HostError::UnknownNode(node));
        }
        self.restore_subtree(token.subtree);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.text = token.text;
            n.children = token.children.clone();
            n.blanked = false;
        }
        self.pending_mutations
            .push(MutationBatch::child_list(node, token.children, Vec::new()));
        self.recompute_visibility();
        Ok(())
    }

    fn detach_node(&mut self, node: NodeId) -> Result<DetachedNode, HostError> {
        if !self.is_connected(node) {
            return Err(HostError::NotConnected(node));
        }
        self.unlink_from_parent(node);
        let subtree = self.extract_subtree(&[node]);
        let list = self.list;
        self.pending_mutations
            .push(MutationBatch::child_list(list, Vec::new(), vec![node]));
        self.recompute_visibility();
        Ok(DetachedNode {
            root: node,
            subtree,
        })
    }

    fn reattach_before(
        &mut self,
        anchor: NodeId,
        node: DetachedNode,
    ) -> Result<NodeId, HostError> {
        if !self.is_connected(anchor) {
            return Err(HostError::NotConnected(anchor));
        }
        let parent = self
            .nodes
            .get(&anchor)
            .and_then(|n| n.parent)
            .ok_or(HostError::NotConnected(anchor))?;
        let root = node.root;
        self.restore_subtree(node.subtree);
        if let Some(n) = self.nodes.get_mut(&root) {
            n.parent = Some(parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let at = parent_node
                .children
                .iter()
                .position(|c| *c == anchor)
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(at, root);
        }
        self.pending_mutations
            .push(MutationBatch::child_list(parent, vec![root], Vec::new()));
        self.recompute_visibility();
        Ok(root)
    }

    fn insert_placeholder_before(
        &mut self,
        anchor: NodeId,
        spec: &PlaceholderSpec,
    ) -> Result<NodeId, HostError> {
        if !self.is_connected(anchor) {
            return Err(HostError::NotConnected(anchor));
        }
        let parent = self
            .nodes
            .get(&anchor)
            .and_then(|n| n.parent)
            .ok_or(HostError::NotConnected(anchor))?;
        let id = self.make_placeholder(parent, spec);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let at = parent_node
                .children
                .iter()
                .position(|c| *c == anchor)
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(at, id);
        }
        self.pending_mutations
            .push(MutationBatch::child_list(parent, vec![id], Vec::new()));
        self.recompute_visibility();
        Ok(id)
    }

    fn insert_placeholder_into(
        &mut self,
        parent: NodeId,
        spec: &PlaceholderSpec,
    ) -> Result<NodeId, HostError> {
        if !self.is_connected(parent) {
            return Err(HostError::NotConnected(parent));
        }
        let id = self.make_placeholder(parent, spec);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        self.pending_mutations
            .push(MutationBatch::child_list(parent, vec![id], Vec::new()));
        self.recompute_visibility();
        Ok(id)
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), HostError> {
        if !self.nodes.contains_key(&node) {
            return Err(HostError::UnknownNode(node));
        }
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        self.unlink_from_parent(node);
        self.drop_subtree(node);
        if let Some(parent) = parent {
            self.pending_mutations
                .push(MutationBatch::child_list(parent, Vec::new(), vec![node]));
        }
        self.recompute_visibility();
        Ok(())
    }

    fn observe(&mut self, node: NodeId) {
        if self.observed.contains_key(&node) {
            return;
        }
        let intersecting = self.is_connected(node) && self.intersects_margined(node);
        self.observed.insert(node, intersecting);
        // IntersectionObserver reports an initial state on observe.
        self.pending_visibility.push(VisibilityEvent {
            node,
            entered: intersecting,
        });
    }

    fn unobserve(&mut self, node: NodeId) {
        self.observed.shift_remove(&node);
    }

    fn take_mutations(&mut self) -> Vec<MutationBatch> {
        std::mem::take(&mut self.pending_mutations)
    }

    fn take_visibility_events(&mut self) -> Vec<VisibilityEvent> {
        std::mem::take(&mut self.pending_visibility)
    }
}

impl SimPage {
    fn make_placeholder(&mut self, parent: NodeId, spec: &PlaceholderSpec) -> NodeId {
        let mut node = SimNode::element("div");
        node.classes.push("cf-placeholder".into());
        node.height = spec.reserved_height;
        node.parent = Some(parent);
        if let Some(title) = spec.title() {
            node.attrs.insert("title".into(), title.into());
        }
        if let Some(label) = spec.label() {
            node.text = label.into();
        }
        self.alloc(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MutationKind;

    fn page_with_turns(heights: &[f64]) -> (SimPage, Vec<NodeId>) {
        let mut page = SimPage::new(300.0);
        let ids = heights
            .iter()
            .enumerate()
            .map(|(i, h)| page.append_turn(&TurnSpec::new(*h, format!("turn {i}"))))
            .collect();
        (page, ids)
    }

    #[test]
    fn layout_stacks_turns_vertically() {
        let (page, ids) = page_with_turns(&[100.0, 50.0, 75.0]);
        assert_eq!(page.offset_top(ids[0]), Some(0.0));
        assert_eq!(page.offset_top(ids[1]), Some(100.0));
        assert_eq!(page.offset_top(ids[2]), Some(150.0));
        assert_eq!(page.content_height(), 225.0);
    }

    #[test]
    fn query_matches_only_the_requested_family() {
        let mut page = SimPage::new(300.0);
        page.append_turn(&TurnSpec::new(10.0, "a"));
        page.append_turn(&TurnSpec::new(10.0, "b").in_family(SelectorFamily::MessageId));
        assert_eq!(page.query_selector_all(SelectorFamily::TurnTestId).len(), 1);
        assert_eq!(page.query_selector_all(SelectorFamily::MessageId).len(), 1);
        assert_eq!(
            page.query_selector_all(SelectorFamily::ListItemRole).len(),
            0
        );
    }

    #[test]
    fn blank_and_restore_round_trips_content() {
        let mut page = SimPage::new(300.0);
        let id = page.append_turn(&TurnSpec::new(80.0, "hello world").with_spinner());
        let before = page.content_signature(id);

        let token = page.blank_content(id).unwrap();
        assert_eq!(page.text_excerpt(id, usize::MAX), "");
        assert_eq!(page.effective_height(id), 0.0);

        page.restore_content(id, token).unwrap();
        assert_eq!(page.content_signature(id), before);
        assert_eq!(page.effective_height(id), 80.0);
    }

    #[test]
    fn detach_and_reattach_preserves_order_and_id() {
        let (mut page, ids) = page_with_turns(&[10.0, 20.0, 30.0]);
        let detached = page.detach_node(ids[1]).unwrap();
        assert!(!page.is_connected(ids[1]));
        assert_eq!(page.list_children(), vec![ids[0], ids[2]]);

        let back = page.reattach_before(ids[2], detached).unwrap();
        assert_eq!(back, ids[1]);
        assert_eq!(page.list_children(), vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn visibility_events_fire_on_scroll() {
        let (mut page, ids) = page_with_turns(&[500.0, 500.0, 500.0]);
        page.set_observe_margin(0.0);
        page.observe(ids[2]);
        // Initial report: far below the viewport.
        let events = page.take_visibility_events();
        assert_eq!(events, vec![VisibilityEvent { node: ids[2], entered: false }]);

        page.scroll_to(1_200.0);
        let events = page.take_visibility_events();
        assert_eq!(events, vec![VisibilityEvent { node: ids[2], entered: true }]);

        page.scroll_to(0.0);
        let events = page.take_visibility_events();
        assert_eq!(events, vec![VisibilityEvent { node: ids[2], entered: false }]);
    }

    #[test]
    fn mutations_are_batched_and_drained() {
        let mut page = SimPage::new(300.0);
        let id = page.append_turn(&TurnSpec::new(10.0, "x"));
        page.set_status(id, "streaming");
        let muts = page.take_mutations();
        assert_eq!(muts.len(), 2);
        assert_eq!(muts[0].kind, MutationKind::ChildList);
        assert_eq!(muts[1].kind, MutationKind::Attributes);
        assert!(page.take_mutations().is_empty());
    }

    #[test]
    fn zero_height_placeholder_intersects_by_position() {
        let (mut page, ids) = page_with_turns(&[100.0, 100.0, 400.0]);
        page.set_observe_margin(0.0);
        let ph = page
            .insert_placeholder_before(ids[1], &PlaceholderSpec::detached())
            .unwrap();
        page.observe(ph);
        let events = page.take_visibility_events();
        assert_eq!(events, vec![VisibilityEvent { node: ph, entered: true }]);
    }
}
