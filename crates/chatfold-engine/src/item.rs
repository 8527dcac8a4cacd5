//! Per-item bookkeeping shared across engine components.

use strum::Display;

/// How a tracked item is currently represented in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Materialization {
    /// Content fully present
    #[default]
    Expanded,
    /// Content blanked in place, node kept, fixed-height placeholder
    CollapsedStrict,
    /// Node removed from the document, zero-height placeholder marks its
    /// position
    CollapsedDetached,
}

impl Materialization {
    pub fn is_collapsed(self) -> bool {
        !matches!(self, Materialization::Expanded)
    }
}

/// Engine-side state for one tracked conversation turn. The host owns
/// the content; this is only what the engine needs to make decisions.
#[derive(Debug, Clone, Default)]
pub struct ItemMeta {
    pub state: Materialization,
    /// Last measured rendered height, if any. Collapse is deferred until
    /// a measurement exists.
    pub last_height: Option<f64>,
    /// User explicitly expanded this item; sticky until it scrolls away
    pub user_pinned: bool,
    /// Within or adjacent to the viewport per the visibility tracker
    pub visible: bool,
}
