//! Stream lock: a debounced gate that keeps the engine's hands off the
//! document while the newest turn is being written to.
//!
//! Every mutation touching the last tracked item re-asserts the lock and
//! pushes the release deadline out; the lock only drops after the item
//! has been quiet for the full delay AND no longer looks like it is
//! streaming.

use std::time::{Duration, Instant};

use crate::timers::{TimerKind, TimerQueue};

/// Quiet period required before the lock releases.
pub const LOCK_RELEASE_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Default)]
pub struct StreamLock {
    engaged: bool,
}

impl StreamLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Engage the lock and (re)start the release debounce.
    pub fn assert_lock(&mut self, timers: &mut TimerQueue, now: Instant) {
        self.engaged = true;
        timers.arm(TimerKind::LockRelease, now, LOCK_RELEASE_DELAY);
    }

    /// Handle the release timer firing. When the last item still looks
    /// like it is streaming the lock holds and the timer re-arms;
    /// otherwise the lock drops. Returns whether the lock released.
    pub fn on_release_timer(
        &mut self,
        timers: &mut TimerQueue,
        now: Instant,
        still_streaming: bool,
    ) -> bool {
        if !self.engaged {
            return false;
        }
        if still_streaming {
            timers.arm(TimerKind::LockRelease, now, LOCK_RELEASE_DELAY);
            return false;
        }
        self.engaged = false;
        true
    }

    /// Drop the lock unconditionally, e.g. when the engine is disabled.
    pub fn reset(&mut self, timers: &mut TimerQueue) {
        self.engaged = false;
        timers.cancel_kind(TimerKind::LockRelease);
    }
}
