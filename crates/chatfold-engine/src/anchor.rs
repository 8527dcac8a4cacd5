//! Scroll-anchor math for the detached collapse policy.
//!
//! Removing content above the viewport shifts everything the user can
//! see unless the scroll offset moves by exactly the removed height in
//! the same direction. These helpers are pure so the math is testable
//! without a page.

/// Compensation for removing a box of `height` px whose top edge sat at
/// `top`, while the viewport starts at `scroll_top`.
///
/// Some(-height) only when the box lay entirely above the viewport top;
/// anything overlapping or below the viewport needs no compensation.
pub fn removal_compensation(top: f64, height: f64, scroll_top: f64) -> Option<f64> {
    if height <= 0.0 {
        return None;
    }
    if top + height <= scroll_top {
        Some(-height)
    } else {
        None
    }
}

/// Compensation for reinserting a box of `height` px at `top` (its
/// placeholder's position), the inverse of [`removal_compensation`].
pub fn insertion_compensation(top: f64, height: f64, scroll_top: f64) -> Option<f64> {
    if height <= 0.0 {
        return None;
    }
    if top <= scroll_top {
        Some(height)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_above_viewport_compensates_by_exact_height() {
        assert_eq!(removal_compensation(0.0, 100.0, 500.0), Some(-100.0));
        assert_eq!(removal_compensation(400.0, 100.0, 500.0), Some(-100.0));
    }

    #[test]
    fn removal_overlapping_or_below_viewport_does_nothing() {
        // bottom edge pokes into the viewport
        assert_eq!(removal_compensation(450.0, 100.0, 500.0), None);
        // entirely below
        assert_eq!(removal_compensation(900.0, 100.0, 500.0), None);
    }

    #[test]
    fn zero_height_never_compensates() {
        assert_eq!(removal_compensation(0.0, 0.0, 500.0), None);
        assert_eq!(insertion_compensation(0.0, 0.0, 500.0), None);
    }

    #[test]
    fn insertion_is_the_inverse_of_removal() {
        let (top, height, scroll) = (120.0, 80.0, 640.0);
        let removed = removal_compensation(top, height, scroll).unwrap_or(0.0);
        assert_eq!(removed, -80.0);
        // After removal the viewport starts at scroll + removed and the
        // placeholder still sits at `top`.
        let reinserted = insertion_compensation(top, height, scroll + removed).unwrap_or(0.0);
        assert_eq!(removed + reinserted, 0.0);
    }
}
