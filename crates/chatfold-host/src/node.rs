//! Node handles and change-feed records exchanged with the host document.

/// Opaque handle to a node owned by the host document.
///
/// Handles are never reused; a handle for a removed node simply stops
/// resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// Raw numeric value, for logging only.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Structural selector families for locating conversation turns, in
/// priority order. The first family that yields any match wins; later
/// families are not consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorFamily {
    /// `[data-testid="conversation-turn"]`
    TurnTestId,
    /// `[data-message-id]`
    MessageId,
    /// `div[role="listitem"]`
    ListItemRole,
    /// `main .group.w-full`
    GroupFallback,
}

impl SelectorFamily {
    /// Families in the order they are tried.
    pub const PRIORITY: [SelectorFamily; 4] = [
        SelectorFamily::TurnTestId,
        SelectorFamily::MessageId,
        SelectorFamily::ListItemRole,
        SelectorFamily::GroupFallback,
    ];
}

/// Nested markers the streaming detector looks for inside a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// An animated spinner element
    Spinner,
    /// A "thinking" indicator element
    Thinking,
}

/// What kind of change a mutation batch describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added to or removed from `target`
    ChildList,
    /// An attribute on `target` changed
    Attributes,
    /// Text content under `target` changed
    CharacterData,
}

/// One entry in the host change feed. Delivered at least once per actual
/// host mutation; order within a delivery is not guaranteed.
#[derive(Debug, Clone)]
pub struct MutationBatch {
    /// The node the mutation was observed on
    pub target: NodeId,
    pub kind: MutationKind,
    /// Nodes added under `target` (ChildList only)
    pub added: Vec<NodeId>,
    /// Nodes removed from under `target` (ChildList only)
    pub removed: Vec<NodeId>,
}

impl MutationBatch {
    pub fn attribute(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::Attributes,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn character_data(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::CharacterData,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList,
            added,
            removed,
        }
    }
}

/// Enter/exit notification for a node in the observed set, relative to
/// the scrolling container plus the observation margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityEvent {
    pub node: NodeId,
    /// True when the node entered the (margined) viewport, false when it
    /// left it
    pub entered: bool,
}

/// Description of a placeholder the engine asks the host to create.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderSpec {
    /// Height the placeholder reserves in layout. Strict placeholders
    /// reserve the item's last measured height; detached placeholders
    /// reserve zero.
    pub reserved_height: f64,
    /// Detached placeholders are fully inert
    pub detached: bool,
    /// Whether to render the click-to-restore affordance
    pub affordance: bool,
}

impl PlaceholderSpec {
    /// Placeholder for a strict-collapsed item, sized to the content it
    /// stands in for.
    pub fn strict(reserved_height: f64, affordance: bool) -> Self {
        Self {
            reserved_height,
            detached: false,
            affordance,
        }
    }

    /// Zero-height placeholder marking where a detached item belongs.
    pub fn detached() -> Self {
        Self {
            reserved_height: 0.0,
            detached: true,
            affordance: false,
        }
    }

    /// Visible label, if any.
    pub fn label(&self) -> Option<&'static str> {
        if self.detached || !self.affordance {
            None
        } else {
            Some("…")
        }
    }

    /// Hover title, if the affordance is shown.
    pub fn title(&self) -> Option<&'static str> {
        if self.detached || !self.affordance {
            None
        } else {
            Some("Click to expand")
        }
    }
}
