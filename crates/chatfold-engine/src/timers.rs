//! Cooperative timer queue with explicit cancel/re-arm semantics.
//!
//! Each timer kind has at most one pending deadline; arming again moves
//! the deadline (debounce), and a cancelled handle is invalidated by
//! generation so a stale fire can never be observed. The driver supplies
//! `now`, which keeps every test deterministic.

use indexmap::IndexMap;
use std::time::{Duration, Instant};

/// The engine's scheduled work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Stream-lock release debounce
    LockRelease,
    /// Post-mutation re-evaluation debounce
    RescanDebounce,
    /// Periodic fallback pass
    PeriodicScan,
    /// Idle-style height measurement batch
    MeasureSlice,
}

/// Handle to one armed deadline; stale after cancel or re-arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    kind: TimerKind,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    due: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    slots: IndexMap<TimerKind, TimerEntry>,
    generation: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `kind`. Any previous deadline for
    /// the kind is cancelled.
    pub fn arm(&mut self, kind: TimerKind, now: Instant, delay: Duration) -> TimerHandle {
        self.generation += 1;
        let generation = self.generation;
        self.slots.insert(
            kind,
            TimerEntry {
                due: now + delay,
                generation,
            },
        );
        TimerHandle { kind, generation }
    }

    /// Arm only if the kind has no pending deadline already.
    pub fn ensure(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        if !self.slots.contains_key(&kind) {
            self.arm(kind, now, delay);
        }
    }

    /// Cancel a specific handle. A handle superseded by a later arm is
    /// ignored.
    pub fn cancel(&mut self, handle: TimerHandle) {
        if self
            .slots
            .get(&handle.kind)
            .is_some_and(|e| e.generation == handle.generation)
        {
            self.slots.shift_remove(&handle.kind);
        }
    }

    /// Cancel whatever is pending for the kind.
    pub fn cancel_kind(&mut self, kind: TimerKind) {
        self.slots.shift_remove(&kind);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Earliest pending deadline, for drivers that sleep between events.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|e| e.due).min()
    }

    /// Remove and return every kind whose deadline has passed, earliest
    /// first.
    pub fn fire_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .slots
            .iter()
            .filter(|(_, e)| e.due <= now)
            .map(|(k, e)| (e.due, *k))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in &due {
            self.slots.shift_remove(kind);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn arm_and_fire() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.arm(TimerKind::RescanDebounce, t0, ms(100));

        assert!(q.fire_due(t0 + ms(50)).is_empty());
        assert_eq!(q.fire_due(t0 + ms(100)), vec![TimerKind::RescanDebounce]);
        assert!(q.fire_due(t0 + ms(200)).is_empty(), "fired timers are gone");
    }

    #[test]
    fn rearm_moves_the_deadline() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.arm(TimerKind::LockRelease, t0, ms(100));
        q.arm(TimerKind::LockRelease, t0 + ms(80), ms(100));

        assert!(q.fire_due(t0 + ms(120)).is_empty(), "debounced past original");
        assert_eq!(q.fire_due(t0 + ms(180)), vec![TimerKind::LockRelease]);
    }

    #[test]
    fn stale_handle_does_not_cancel_newer_arm() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let stale = q.arm(TimerKind::MeasureSlice, t0, ms(10));
        q.arm(TimerKind::MeasureSlice, t0, ms(50));
        q.cancel(stale);
        assert!(q.is_armed(TimerKind::MeasureSlice));

        q.cancel_kind(TimerKind::MeasureSlice);
        assert!(!q.is_armed(TimerKind::MeasureSlice));
    }

    #[test]
    fn ensure_does_not_push_back_pending_deadline() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.arm(TimerKind::MeasureSlice, t0, ms(10));
        q.ensure(TimerKind::MeasureSlice, t0 + ms(5), ms(100));
        assert_eq!(q.fire_due(t0 + ms(10)), vec![TimerKind::MeasureSlice]);
    }

    #[test]
    fn fire_due_orders_by_deadline() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.arm(TimerKind::PeriodicScan, t0, ms(30));
        q.arm(TimerKind::LockRelease, t0, ms(10));
        assert_eq!(
            q.fire_due(t0 + ms(40)),
            vec![TimerKind::LockRelease, TimerKind::PeriodicScan]
        );
    }
}
