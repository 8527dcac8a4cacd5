//! The virtualizer: wires the tracker, streaming detector, stream lock,
//! collapse engine, visibility tracker and measurement queue into one
//! event-driven state machine.
//!
//! A driver owns the [`HostPage`] and forwards three things: drained
//! mutation batches, drained visibility events, and time (via
//! [`Virtualizer::tick`]). Every pass is idempotent; running one twice
//! in a row with no intervening host change does nothing the second
//! time.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use chatfold_host::{
    CollapsePolicy, HostError, HostPage, MutationBatch, MutationKind, NodeId, Settings,
    VisibilityEvent,
};

use crate::collapse::CollapseEngine;
use crate::item::Materialization;
use crate::lock::StreamLock;
use crate::measure::{MEASURE_SLICE_DELAY, MeasureQueue};
use crate::streaming::is_streaming;
use crate::timers::{TimerKind, TimerQueue};
use crate::tracker::{AddOutcome, ItemTracker};
use crate::visibility::VisibilityTracker;

/// Debounce between a mutation burst and the re-evaluation pass.
pub const RESCAN_DEBOUNCE: Duration = Duration::from_millis(180);

/// Fallback full-rescan cadence, catching anything the change feed
/// missed.
pub const PERIODIC_SCAN: Duration = Duration::from_millis(1200);

/// Detached items reattached per scroll notification.
pub const REATTACH_BATCH: usize = 3;

/// Snapshot of the engine's externally interesting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub tracked: usize,
    pub collapsed: usize,
    pub enabled: bool,
    pub locked: bool,
}

impl EngineStatus {
    /// One-line status for an overlay or log line.
    pub fn summary(&self) -> String {
        format!("chatfold: {} optimized", self.collapsed)
    }
}

#[derive(Debug)]
pub struct Virtualizer {
    settings: Settings,
    enabled: bool,
    booted: bool,
    tracker: ItemTracker,
    collapse: CollapseEngine,
    lock: StreamLock,
    timers: TimerQueue,
    visibility: VisibilityTracker,
    measures: MeasureQueue,
    /// Revision the last completed pass saw; unchanged revision means
    /// the pass can be skipped unless something forced re-evaluation.
    last_pass_revision: Option<u64>,
    force_reval: bool,
}

impl Virtualizer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: settings.sanitized(),
            enabled: true,
            booted: false,
            tracker: ItemTracker::new(),
            collapse: CollapseEngine::new(),
            lock: StreamLock::new(),
            timers: TimerQueue::new(),
            visibility: VisibilityTracker::new(),
            measures: MeasureQueue::new(),
            last_pass_revision: None,
            force_reval: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            tracked: self.tracker.len(),
            collapsed: self.collapse.collapsed_count(),
            enabled: self.enabled,
            locked: self.lock.is_engaged(),
        }
    }

    /// Earliest pending timer deadline, for drivers that sleep between
    /// events.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Initial scan of an already-populated document.
    pub fn boot<P: HostPage>(&mut self, page: &mut P, now: Instant) {
        self.booted = true;
        self.tracker.mark_dirty();
        self.timers.arm(TimerKind::PeriodicScan, now, PERIODIC_SCAN);
        self.force_reval = true;
        self.run_pass(page, now);
        for item in self.tracker.items() {
            self.measures.enqueue(item);
        }
        self.timers
            .ensure(TimerKind::MeasureSlice, now, MEASURE_SLICE_DELAY);
        debug!(tracked = self.tracker.len(), "virtualizer booted");
    }

    /// Feed a burst of host mutations.
    pub fn on_mutations<P: HostPage>(
        &mut self,
        page: &mut P,
        batches: &[MutationBatch],
        now: Instant,
    ) {
        if !self.enabled || batches.is_empty() {
            return;
        }
        let mut touched: Vec<NodeId> = Vec::new();
        let mut touch = |touched: &mut Vec<NodeId>, item: NodeId| {
            if !touched.contains(&item) {
                touched.push(item);
            }
        };
        for batch in batches {
            if self.collapse.owns_placeholder(batch.target) {
                continue;
            }
            match batch.kind {
                MutationKind::ChildList => {
                    for added in &batch.added {
                        if self.collapse.owns_placeholder(*added) {
                            continue;
                        }
                        let collapse = &self.collapse;
                        match self
                            .tracker
                            .add_candidate(page, *added, |id| collapse.anchor_node(id))
                        {
                            AddOutcome::Added(item) => {
                                self.measures.enqueue(item);
                                touch(&mut touched, item);
                            }
                            AddOutcome::AlreadyTracked(item) => touch(&mut touched, item),
                            AddOutcome::Unmapped => {}
                        }
                    }
                    for removed in &batch.removed {
                        if self.collapse.owns_placeholder(*removed) {
                            continue;
                        }
                        if !self.tracker.contains(*removed) {
                            continue;
                        }
                        if self.collapse.is_detached(*removed) {
                            // Our own detachment echoing back.
                            continue;
                        }
                        self.drop_item(page, *removed);
                    }
                    if self.tracker.contains(batch.target) {
                        touch(&mut touched, batch.target);
                    }
                }
                MutationKind::Attributes | MutationKind::CharacterData => {
                    if let Some(item) = self.normalize(page, batch.target) {
                        touch(&mut touched, item);
                    }
                }
            }
        }

        if let Some(last) = self.tracker.last()
            && touched.contains(&last)
        {
            self.lock.assert_lock(&mut self.timers, now);
        }
        for item in &touched {
            let expanded = self
                .tracker
                .meta(*item)
                .is_some_and(|m| m.state == Materialization::Expanded);
            if expanded {
                self.measures.enqueue(*item);
            }
        }
        self.timers.arm(TimerKind::RescanDebounce, now, RESCAN_DEBOUNCE);
        if !self.measures.is_empty() {
            self.timers
                .ensure(TimerKind::MeasureSlice, now, MEASURE_SLICE_DELAY);
        }
    }

    /// Feed drained visibility enter/exit events.
    pub fn on_visibility_events<P: HostPage>(
        &mut self,
        page: &mut P,
        events: &[VisibilityEvent],
        now: Instant,
    ) {
        if !self.enabled {
            return;
        }
        let mut anchors_changed = false;
        for event in events {
            let Some(item) = self.resolve_item(event.node) else {
                continue;
            };
            if event.entered {
                if let Some(meta) = self.tracker.meta_mut(item) {
                    meta.visible = true;
                }
                let collapsed = self
                    .tracker
                    .meta(item)
                    .is_some_and(|m| m.state.is_collapsed());
                if collapsed && !self.lock.is_engaged() && self.apply_expand(page, item, false) {
                    anchors_changed = true;
                }
            } else {
                let Some(meta) = self.tracker.meta_mut(item) else {
                    continue;
                };
                meta.visible = false;
                meta.user_pinned = false;
                let state = meta.state;
                let height = meta.last_height;
                if state != Materialization::Expanded {
                    continue;
                }
                if self.lock.is_engaged() || self.in_tail(item) {
                    continue;
                }
                if is_streaming(page, item, state) {
                    continue;
                }
                match height {
                    Some(height) => {
                        if self.apply_collapse(page, item, height) {
                            anchors_changed = true;
                        }
                    }
                    None => {
                        self.measures.enqueue(item);
                        self.timers
                            .ensure(TimerKind::MeasureSlice, now, MEASURE_SLICE_DELAY);
                    }
                }
            }
        }
        if anchors_changed {
            self.reconcile_observation(page);
        }
    }

    /// Scroll notification. Under the detached policy this proactively
    /// reattaches items whose placeholder is inside the viewport, so the
    /// user scrolling back up never stares at a hole.
    pub fn on_scroll<P: HostPage>(&mut self, page: &mut P, _now: Instant) {
        if !self.enabled || self.lock.is_engaged() {
            return;
        }
        if self.reattach_near_top(page) > 0 {
            self.reconcile_observation(page);
        }
    }

    /// Reattach up to [`REATTACH_BATCH`] detached items whose placeholder
    /// sits inside the strict viewport. The window is narrower than the
    /// visibility observation margin; a margined window thrashes against
    /// exit-driven re-collapse at the viewport edge.
    fn reattach_near_top<P: HostPage>(&mut self, page: &mut P) -> usize {
        if self.settings.policy != CollapsePolicy::Detached {
            return 0;
        }
        let vmin = page.scroll_top();
        let vmax = vmin + page.viewport_height();
        let mut reattached = 0usize;
        for item in self.collapse.detached_items() {
            if reattached >= REATTACH_BATCH {
                break;
            }
            let Some(placeholder) = self.collapse.placeholder_of(item) else {
                continue;
            };
            let Some(top) = page.offset_top(placeholder) else {
                continue;
            };
            if top >= vmin && top <= vmax && self.apply_expand(page, item, false) {
                reattached += 1;
            }
        }
        reattached
    }

    /// Advance time; fires due timers.
    pub fn tick<P: HostPage>(&mut self, page: &mut P, now: Instant) {
        if !self.enabled {
            return;
        }
        for kind in self.timers.fire_due(now) {
            match kind {
                TimerKind::LockRelease => {
                    let still_streaming = self.tracker.last().is_some_and(|last| {
                        let state = self
                            .tracker
                            .meta(last)
                            .map(|m| m.state)
                            .unwrap_or_default();
                        is_streaming(page, last, state)
                    });
                    if self.lock.on_release_timer(&mut self.timers, now, still_streaming) {
                        trace!("stream lock released");
                        self.force_reval = true;
                        self.run_pass(page, now);
                    }
                }
                TimerKind::RescanDebounce => self.run_pass(page, now),
                TimerKind::PeriodicScan => {
                    self.tracker.mark_dirty();
                    self.timers.arm(TimerKind::PeriodicScan, now, PERIODIC_SCAN);
                    self.run_pass(page, now);
                }
                TimerKind::MeasureSlice => {
                    let measured = self.measures.run_slice(page);
                    for (node, height) in &measured {
                        if let Some(meta) = self.tracker.meta_mut(*node)
                            && meta.state == Materialization::Expanded
                        {
                            meta.last_height = Some(*height);
                        }
                    }
                    if !self.measures.is_empty() {
                        self.timers
                            .arm(TimerKind::MeasureSlice, now, MEASURE_SLICE_DELAY);
                    }
                    if !measured.is_empty() {
                        self.force_reval = true;
                        self.run_pass(page, now);
                    }
                }
            }
        }
    }

    /// Drain the page's pending event feeds and advance time, in the
    /// order a browser-side driver would.
    pub fn service<P: HostPage>(&mut self, page: &mut P, now: Instant) {
        let mutations = page.take_mutations();
        self.on_mutations(page, &mutations, now);
        let events = page.take_visibility_events();
        self.on_visibility_events(page, &events, now);
        self.tick(page, now);
    }

    /// User-initiated expansion of one item (placeholder click). Honored
    /// even while the stream lock is engaged, and pins the item expanded
    /// until it scrolls out of view.
    pub fn request_expand<P: HostPage>(
        &mut self,
        page: &mut P,
        node: NodeId,
        _now: Instant,
    ) -> Result<bool, HostError> {
        let Some(item) = self.resolve_item(node) else {
            return Ok(false);
        };
        let expanded = self.apply_expand(page, item, true);
        if let Some(meta) = self.tracker.meta_mut(item) {
            meta.user_pinned = true;
        }
        if expanded {
            self.reconcile_observation(page);
        }
        Ok(expanded)
    }

    /// Master switch. Disabling restores every collapsed item and stops
    /// all scheduled work; re-enabling rescans from scratch.
    pub fn set_enabled<P: HostPage>(&mut self, page: &mut P, enabled: bool, now: Instant) {
        if enabled == self.enabled {
            return;
        }
        if enabled {
            self.enabled = true;
            if self.booted {
                self.tracker.mark_dirty();
                self.timers.arm(TimerKind::PeriodicScan, now, PERIODIC_SCAN);
                self.force_reval = true;
                self.run_pass(page, now);
            } else {
                self.boot(page, now);
            }
        } else {
            self.expand_all(page);
            self.visibility.clear(page);
            self.lock.reset(&mut self.timers);
            self.timers.clear();
            self.measures.clear();
            self.last_pass_revision = None;
            self.enabled = false;
            debug!("virtualizer disabled, all items restored");
        }
    }

    /// Apply new settings. A policy change restores everything first so
    /// no item is left collapsed under the old representation.
    pub fn apply_settings<P: HostPage>(&mut self, page: &mut P, settings: Settings, now: Instant) {
        let settings = settings.sanitized();
        if settings.policy != self.settings.policy {
            self.expand_all(page);
        }
        self.settings = settings;
        self.force_reval = true;
        if self.enabled && self.booted {
            self.run_pass(page, now);
        }
    }

    /// One full evaluation pass over the tracked items.
    pub fn run_pass<P: HostPage>(&mut self, page: &mut P, now: Instant) {
        if !self.enabled {
            return;
        }
        if self.tracker.is_dirty() {
            let collapse = &self.collapse;
            self.tracker.rebuild_full(page, |id| collapse.anchor_node(id));
        }
        self.audit_registries(page);
        // The lock must hold whenever the tail streams, not only when the
        // streaming was witnessed through the mutation feed. Boot, the
        // periodic scan, and measurement slices all land here.
        if let Some(last) = self.tracker.last() {
            let state = self
                .tracker
                .meta(last)
                .map(|m| m.state)
                .unwrap_or_default();
            if is_streaming(page, last, state) {
                self.lock.assert_lock(&mut self.timers, now);
            }
        }
        if self.lock.is_engaged() {
            trace!("pass skipped, stream lock engaged");
            return;
        }
        if !self.force_reval && self.last_pass_revision == Some(self.tracker.revision()) {
            return;
        }

        let items = self.tracker.items();
        let tail_start = items.len().saturating_sub(self.settings.tail_size);
        let mut collapsed = 0usize;
        let mut expanded = 0usize;
        for (index, item) in items.iter().copied().enumerate() {
            let Some(meta) = self.tracker.meta(item) else {
                continue;
            };
            let state = meta.state;
            let visible = meta.visible;
            let pinned = meta.user_pinned;
            let height = meta.last_height;
            let in_tail = index >= tail_start;

            if state.is_collapsed() {
                if (in_tail || visible || pinned) && self.apply_expand(page, item, false) {
                    expanded += 1;
                }
                continue;
            }
            if in_tail || visible || pinned {
                continue;
            }
            if is_streaming(page, item, state) {
                continue;
            }
            match height {
                Some(height) => {
                    if self.apply_collapse(page, item, height) {
                        collapsed += 1;
                    }
                }
                None => self.measures.enqueue(item),
            }
        }

        expanded += self.reattach_near_top(page);
        self.reconcile_observation(page);
        if !self.measures.is_empty() {
            self.timers
                .ensure(TimerKind::MeasureSlice, now, MEASURE_SLICE_DELAY);
        }
        self.last_pass_revision = Some(self.tracker.revision());
        self.force_reval = false;
        if collapsed > 0 || expanded > 0 {
            debug!(
                collapsed,
                expanded,
                total_collapsed = self.collapse.collapsed_count(),
                tracked = self.tracker.len(),
                "pass applied"
            );
        }
    }

    // --- internals ---

    fn in_tail(&self, item: NodeId) -> bool {
        let len = self.tracker.len();
        let tail_start = len.saturating_sub(self.settings.tail_size);
        self.tracker.index_of(item).is_some_and(|i| i >= tail_start)
    }

    /// Map an event node to the tracked item it belongs to, through a
    /// placeholder when needed.
    fn resolve_item(&self, node: NodeId) -> Option<NodeId> {
        if let Some(item) = self.collapse.item_for_placeholder(node) {
            return Some(item);
        }
        if self.tracker.contains(node) {
            return Some(node);
        }
        None
    }

    /// Normalize a mutation target to its tracked item container.
    fn normalize<P: HostPage>(&self, page: &P, node: NodeId) -> Option<NodeId> {
        if self.tracker.contains(node) {
            return Some(node);
        }
        let family = self.tracker.active_family()?;
        let container = page.closest_container(node, family)?;
        self.tracker.contains(container).then_some(container)
    }

    fn successor_anchor_for(&self, item: NodeId) -> Option<NodeId> {
        let index = self.tracker.index_of(item)?;
        self.tracker
            .items()
            .into_iter()
            .skip(index + 1)
            .map(|next| self.collapse.anchor_node(next))
            .next()
    }

    fn apply_expand<P: HostPage>(&mut self, page: &mut P, item: NodeId, pin: bool) -> bool {
        let fallback = self.successor_anchor_for(item);
        match self.collapse.expand(page, item, fallback) {
            Ok(changed) => {
                if let Some(meta) = self.tracker.meta_mut(item) {
                    meta.state = Materialization::Expanded;
                    meta.user_pinned = meta.user_pinned || pin;
                }
                if changed {
                    self.measures.enqueue(item);
                }
                changed
            }
            Err(err) => {
                warn!(item = item.raw(), %err, "expand failed");
                if !self.collapse.is_collapsed(item) {
                    // Restoration token is gone; the content is lost and
                    // the item can no longer be represented.
                    self.drop_item(page, item);
                }
                false
            }
        }
    }

    fn apply_collapse<P: HostPage>(&mut self, page: &mut P, item: NodeId, height: f64) -> bool {
        let result = match self.settings.policy {
            CollapsePolicy::Strict => {
                self.collapse
                    .collapse_strict(page, item, height, self.settings.overlay_visible)
            }
            CollapsePolicy::Detached => self.collapse.collapse_detached(page, item, height),
        };
        match result {
            Ok(()) => {
                let state = match self.settings.policy {
                    CollapsePolicy::Strict => Materialization::CollapsedStrict,
                    CollapsePolicy::Detached => Materialization::CollapsedDetached,
                };
                if let Some(meta) = self.tracker.meta_mut(item) {
                    meta.state = state;
                    meta.last_height = Some(height);
                }
                true
            }
            Err(err) => {
                warn!(item = item.raw(), %err, "collapse failed");
                if matches!(err, HostError::NotConnected(_)) {
                    self.drop_item(page, item);
                }
                false
            }
        }
    }

    fn expand_all<P: HostPage>(&mut self, page: &mut P) {
        for item in self.collapse.collapsed_items() {
            self.apply_expand(page, item, false);
        }
        self.reconcile_observation(page);
    }

    fn drop_item<P: HostPage>(&mut self, page: &mut P, item: NodeId) {
        self.tracker.remove_candidate(item);
        self.collapse.discard(page, item);
        self.measures.remove(item);
        self.visibility.forget(page, item);
    }

    /// Repair registry drift against the live document: placeholders the
    /// host wiped, items the host destroyed while collapsed.
    fn audit_registries<P: HostPage>(&mut self, page: &mut P) {
        for item in self.collapse.collapsed_items() {
            if !self.tracker.contains(item) {
                self.collapse.discard(page, item);
                continue;
            }
            let placeholder_alive = self
                .collapse
                .placeholder_of(item)
                .is_some_and(|ph| page.is_connected(ph));
            if self.collapse.is_detached(item) {
                if !placeholder_alive {
                    // Reinsertion point lost; restore next to the
                    // surviving neighbor before the position drifts
                    // further.
                    self.apply_expand(page, item, false);
                }
            } else if !page.is_connected(item) {
                warn!(item = item.raw(), "collapsed item destroyed by host, content lost");
                self.drop_item(page, item);
            }
        }
    }

    fn reconcile_observation<P: HostPage>(&mut self, page: &mut P) {
        let desired: Vec<NodeId> = self
            .tracker
            .items()
            .into_iter()
            .map(|item| self.collapse.anchor_node(item))
            .collect();
        self.visibility.reconcile(page, &desired);
    }
}
