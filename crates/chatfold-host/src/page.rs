//! The surface the virtualization engine is allowed to touch.

use crate::error::HostError;
use crate::node::{
    Marker, MutationBatch, NodeId, PlaceholderSpec, SelectorFamily, VisibilityEvent,
};
use crate::sim::{ContentToken, DetachedNode};

/// Everything the engine may observe or do to the host document.
///
/// All mutating operations are best-effort from the engine's point of
/// view: a returned error leaves the document in its previous state and
/// the engine retries on a later pass.
pub trait HostPage {
    // --- structure queries ---

    /// All rendered nodes matching the selector family, in document order.
    fn query_selector_all(&self, family: SelectorFamily) -> Vec<NodeId>;

    /// Nearest enclosing node (including `node` itself) that matches the
    /// selector family. Used to normalize change-feed entries to their
    /// item container.
    fn closest_container(&self, node: NodeId, family: SelectorFamily) -> Option<NodeId>;

    /// Whether the node is still attached to the document.
    fn is_connected(&self, node: NodeId) -> bool;

    /// Depth-first position of the node in the document, for order
    /// comparison. None for detached or unknown nodes.
    fn document_position(&self, node: NodeId) -> Option<u64>;

    // --- per-node observation ---

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn has_marker(&self, node: NodeId, marker: Marker) -> bool;

    /// Whether any descendant of `node` carries the marker.
    fn descendant_with_marker(&self, node: NodeId, marker: Marker) -> bool;

    /// Leading text content of the subtree, at most `limit` characters.
    fn text_excerpt(&self, node: NodeId, limit: usize) -> String;

    // --- geometry ---

    /// Current rendered height of the node. May fail transiently (layout
    /// not ready).
    fn measure_height(&self, node: NodeId) -> Result<f64, HostError>;

    /// Offset of the node's top edge from the top of the scrollable
    /// content.
    fn offset_top(&self, node: NodeId) -> Option<f64>;

    fn scroll_top(&self) -> f64;

    fn viewport_height(&self) -> f64;

    /// Adjust the scroll offset by `delta` pixels (the scroll-anchor
    /// compensation call).
    fn scroll_by(&mut self, delta: f64) -> Result<(), HostError>;

    // --- materialization side effects ---

    /// Remove the node's content, returning a token that restores it
    /// byte-identically. The node itself stays in the document.
    fn blank_content(&mut self, node: NodeId) -> Result<ContentToken, HostError>;

    /// Restore content previously captured with [`Self::blank_content`].
    fn restore_content(&mut self, node: NodeId, token: ContentToken) -> Result<(), HostError>;

    /// Remove the node and its subtree from the document, returning an
    /// owned token for later reinsertion.
    fn detach_node(&mut self, node: NodeId) -> Result<DetachedNode, HostError>;

    /// Reinsert a detached subtree immediately before `anchor`. Returns
    /// the (unchanged) id of the reinserted node.
    fn reattach_before(&mut self, anchor: NodeId, node: DetachedNode)
    -> Result<NodeId, HostError>;

    /// Insert a placeholder as the previous sibling of `anchor`.
    fn insert_placeholder_before(
        &mut self,
        anchor: NodeId,
        spec: &PlaceholderSpec,
    ) -> Result<NodeId, HostError>;

    /// Insert a placeholder as the last child of `parent`.
    fn insert_placeholder_into(
        &mut self,
        parent: NodeId,
        spec: &PlaceholderSpec,
    ) -> Result<NodeId, HostError>;

    /// Remove a node the engine created (placeholders only).
    fn remove_node(&mut self, node: NodeId) -> Result<(), HostError>;

    // --- event feeds (pulled by the driver, forwarded to the engine) ---

    /// Add a node to the visibility-observed set.
    fn observe(&mut self, node: NodeId);

    /// Remove a node from the visibility-observed set.
    fn unobserve(&mut self, node: NodeId);

    /// Drain mutation batches accumulated since the last call.
    fn take_mutations(&mut self) -> Vec<MutationBatch>;

    /// Drain visibility enter/exit events accumulated since the last call.
    fn take_visibility_events(&mut self) -> Vec<VisibilityEvent>;
}
