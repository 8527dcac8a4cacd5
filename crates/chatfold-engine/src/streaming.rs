//! Streaming detector: is a turn still being written to by the host?
//!
//! An explicitly ordered list of independent signals, most reliable
//! first. Later heuristics only apply when the earlier signals are
//! absent, so the precedence order is load-bearing: a present status
//! attribute answers the question outright, terminal or not.

use chatfold_host::{HostPage, Marker, NodeId};

use crate::item::Materialization;

/// Attribute a host integration can set to pin an item as in-flight.
pub const LOCK_ATTR: &str = "data-chatfold-lock";

/// Status attributes checked in order; the first present one is used.
const STATUS_ATTRS: [&str; 2] = ["data-message-status", "data-status"];

/// Vocabulary meaning "this turn is settled".
const TERMINAL_STATUSES: [&str; 7] = [
    "finished",
    "done",
    "complete",
    "completed",
    "success",
    "stop",
    "resolved",
];

const TEXT_PROBE_CHARS: usize = 200;

/// Pure predicate: is the item still being actively written to?
///
/// Already-collapsed items are never streaming; collapsing implies the
/// engine judged them settled.
pub fn is_streaming<P: HostPage>(page: &P, node: NodeId, state: Materialization) -> bool {
    if state.is_collapsed() {
        return false;
    }
    if has_lock_flag(page, node) {
        return true;
    }
    if let Some(status) = status_attribute(page, node) {
        return !is_terminal_status(&status);
    }
    if has_streaming_flag(page, node) {
        return true;
    }
    if is_busy(page, node) {
        return true;
    }
    if has_thinking_marker(page, node) {
        return true;
    }
    text_looks_streaming(&page.text_excerpt(node, TEXT_PROBE_CHARS))
}

/// Signal 1: explicit host lock flag.
pub fn has_lock_flag<P: HostPage>(page: &P, node: NodeId) -> bool {
    page.attribute(node, LOCK_ATTR).is_some()
}

/// Signal 2 input: the item's status attribute, if any.
pub fn status_attribute<P: HostPage>(page: &P, node: NodeId) -> Option<String> {
    STATUS_ATTRS.iter().find_map(|name| page.attribute(node, name))
}

/// Signal 2: does a status value mean the turn is settled?
pub fn is_terminal_status(status: &str) -> bool {
    let status = status.trim().to_ascii_lowercase();
    TERMINAL_STATUSES.iter().any(|t| *t == status)
}

/// Signal 3: explicit streaming flag.
pub fn has_streaming_flag<P: HostPage>(page: &P, node: NodeId) -> bool {
    if page
        .attribute(node, "data-streaming")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return true;
    }
    page.attribute(node, "data-is-streaming").is_some()
}

/// Signal 4: busy indicator.
pub fn is_busy<P: HostPage>(page: &P, node: NodeId) -> bool {
    page.attribute(node, "aria-busy")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Signal 5: nested thinking/spinner marker.
pub fn has_thinking_marker<P: HostPage>(page: &P, node: NodeId) -> bool {
    page.has_marker(node, Marker::Spinner)
        || page.has_marker(node, Marker::Thinking)
        || page.descendant_with_marker(node, Marker::Spinner)
        || page.descendant_with_marker(node, Marker::Thinking)
}

/// Signal 6: text heuristic, only consulted when no status attribute
/// exists.
pub fn text_looks_streaming(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.ends_with('…') || trimmed.ends_with("...") {
        return true;
    }
    let lower = trimmed.to_lowercase();
    lower.contains("thinking") || lower.contains("processing")
}
