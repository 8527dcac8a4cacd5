//! End-to-end engine behavior against the in-memory page.
//!
//! The driver loop here mirrors what a browser-side integration does:
//! drain mutation and visibility feeds, tick the clock, repeat. Time is
//! advanced to the engine's next deadline, so debounces and the stream
//! lock play out deterministically.

use std::time::{Duration, Instant};

use chatfold_engine::Virtualizer;
use chatfold_host::{CollapsePolicy, HostPage, NodeId, Settings, SimPage, TurnSpec};

fn build_page(turns: usize) -> (SimPage, Vec<NodeId>) {
    let mut page = SimPage::new(300.0);
    let ids = (0..turns)
        .map(|i| page.append_turn(&TurnSpec::new(100.0, format!("turn {i}"))))
        .collect();
    (page, ids)
}

/// Boot against an already-built page, discarding construction noise
/// the way a driver attaching to an existing conversation would.
fn boot(v: &mut Virtualizer, page: &mut SimPage, now: Instant) {
    page.take_mutations();
    page.take_visibility_events();
    v.boot(page, now);
}

/// Service the engine until its timers run dry of interesting work.
fn settle(v: &mut Virtualizer, page: &mut SimPage, now: &mut Instant) {
    for _ in 0..40 {
        v.service(page, *now);
        match v.next_deadline() {
            Some(deadline) if deadline > *now => *now = deadline,
            _ => *now += Duration::from_millis(50),
        }
    }
}

fn detached_settings(tail: usize) -> Settings {
    Settings {
        tail_size: tail,
        policy: CollapsePolicy::Detached,
        ..Settings::default()
    }
}

fn strict_settings(tail: usize) -> Settings {
    Settings {
        tail_size: tail,
        policy: CollapsePolicy::Strict,
        ..Settings::default()
    }
}

#[test]
fn collapses_everything_outside_tail_and_viewport() {
    let (mut page, _ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);

    let status = v.status();
    assert_eq!(status.tracked, 25);
    assert_eq!(status.collapsed, 15, "everything before the tail folds");
    assert_eq!(status.summary(), "chatfold: 15 optimized");
    assert_eq!(page.content_height(), 1000.0, "only the tail keeps height");
    assert_eq!(
        page.visible_texts(),
        vec!["turn 22", "turn 23", "turn 24"],
        "reader's view never moved"
    );
    // One zero-height placeholder per collapsed item stays in the list.
    assert_eq!(page.list_children().len(), 25);
}

#[test]
fn passes_are_idempotent() {
    let (mut page, _ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);

    let status = v.status();
    let texts = page.visible_texts();
    let height = page.content_height();
    let scroll = page.scroll_top();

    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status(), status);
    assert_eq!(page.visible_texts(), texts);
    assert_eq!(page.content_height(), height);
    assert_eq!(page.scroll_top(), scroll);
}

#[test]
fn strict_collapse_keeps_nodes_and_restores_content_identically() {
    let (mut page, ids) = build_page(20);
    page.scroll_to(f64::MAX);
    let before = page.content_signature(ids[0]);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(strict_settings(5));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);

    assert!(v.status().collapsed > 0);
    assert!(page.is_connected(ids[0]), "strict never removes the node");
    assert_eq!(page.content_height(), 2000.0, "reserved heights add up");
    assert_eq!(page.text_excerpt(ids[0], usize::MAX), "…");

    assert!(v.request_expand(&mut page, ids[0], now).unwrap());
    assert_eq!(page.content_signature(ids[0]), before);
}

#[test]
fn user_expansion_pins_until_the_item_scrolls_away() {
    let (mut page, ids) = build_page(20);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(strict_settings(5));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(page.text_excerpt(ids[2], usize::MAX), "…");

    assert!(v.request_expand(&mut page, ids[2], now).unwrap());
    settle(&mut v, &mut page, &mut now);
    assert_eq!(
        page.text_excerpt(ids[2], usize::MAX),
        "turn 2",
        "pinned item survives passes"
    );

    // Scroll it through the viewport and away again: the pin clears on
    // exit and the item folds back.
    page.scroll_to(0.0);
    settle(&mut v, &mut page, &mut now);
    page.scroll_to(f64::MAX);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(page.text_excerpt(ids[2], usize::MAX), "…");
}

#[test]
fn stream_lock_defers_all_folding_until_quiet() {
    let (mut page, _ids) = build_page(10);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(4));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    let folded_before = v.status().collapsed;
    assert_eq!(folded_before, 3);

    // Rapid-fire appends: each one touches the newest item, so the lock
    // stays held the whole time and nothing new folds.
    let mut last = None;
    for i in 10..14 {
        let spec = TurnSpec::new(100.0, format!("turn {i}")).streaming();
        last = Some(page.append_turn(&spec));
        page.scroll_to(f64::MAX);
        now += Duration::from_millis(150);
        v.service(&mut page, now);
        assert!(v.status().locked, "activity on the newest item locks");
        assert_eq!(v.status().collapsed, folded_before);
    }

    // Quiet, but the newest item still carries a streaming flag: the
    // release timer re-arms instead of dropping the lock.
    now += Duration::from_millis(500);
    v.service(&mut page, now);
    assert!(v.status().locked);
    assert_eq!(v.status().collapsed, folded_before);

    // The turn settles; after the quiet period the lock drops and the
    // backlog folds.
    page.set_status(last.unwrap(), "done");
    settle(&mut v, &mut page, &mut now);
    assert!(!v.status().locked);
    assert!(
        v.status().collapsed > folded_before,
        "backlog folds after release, got {}",
        v.status().collapsed
    );
}

#[test]
fn streaming_tail_at_boot_locks_before_anything_folds() {
    // The stream is already in flight when the engine attaches, so no
    // mutation ever reports it; the lock has to come from the pass.
    let (mut page, _ids) = build_page(24);
    let last = page.append_turn(&TurnSpec::new(100.0, "turn 24").streaming());
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert!(v.status().locked, "streaming tail engages the lock on boot");
    assert_eq!(v.status().collapsed, 0, "no transitions while the tail streams");
    assert_eq!(page.content_height(), 2500.0);

    page.set_status(last, "done");
    settle(&mut v, &mut page, &mut now);
    assert!(!v.status().locked);
    assert_eq!(v.status().collapsed, 15, "backlog folds once the tail settles");
}

#[test]
fn scrolling_back_up_restores_the_beginning() {
    let (mut page, _ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().collapsed, 15);

    // Proactive reattachment on the scroll notification itself, view
    // held stable by compensation.
    page.scroll_to(0.0);
    let view = page.visible_texts();
    v.on_scroll(&mut page, now);
    assert_eq!(v.status().collapsed, 12, "one reattach batch");
    assert_eq!(page.visible_texts(), view);

    // A user holding the scrollbar at the top wins against the
    // compensation within a few frames.
    for _ in 0..12 {
        page.scroll_to(0.0);
        now += Duration::from_millis(200);
        v.service(&mut page, now);
    }
    page.scroll_to(0.0);
    let visible = page.visible_texts();
    assert_eq!(visible[0], "turn 0");
    assert_eq!(visible[1], "turn 1");
}

#[test]
fn disabling_restores_everything_and_reenabling_folds_again() {
    let (mut page, _ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().collapsed, 15);
    let view = page.visible_texts();

    v.set_enabled(&mut page, false, now);
    assert!(!v.status().enabled);
    assert_eq!(v.status().collapsed, 0);
    assert_eq!(page.content_height(), 2500.0, "all heights restored");
    assert_eq!(page.visible_texts(), view, "view stable through restore");

    v.set_enabled(&mut page, true, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().collapsed, 15);
}

#[test]
fn policy_switch_restores_before_refolding_under_the_new_policy() {
    let (mut page, ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert!(!page.is_connected(ids[0]), "detached policy removed it");
    let view = page.visible_texts();

    v.apply_settings(&mut page, strict_settings(10), now);
    settle(&mut v, &mut page, &mut now);

    assert_eq!(v.status().collapsed, 15);
    assert!(page.is_connected(ids[0]), "strict policy keeps every node");
    assert_eq!(page.content_height(), 2500.0, "strict reserves full heights");
    assert_eq!(page.visible_texts(), view, "view stable across the switch");
}

#[test]
fn host_removing_a_turn_drops_it_from_tracking() {
    let (mut page, ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(strict_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().tracked, 25);

    page.remove_turn(ids[20]);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().tracked, 24);
}

#[test]
fn late_insert_lands_in_document_order_and_folds() {
    let (mut page, _ids) = build_page(25);
    page.scroll_to(f64::MAX);
    let mut now = Instant::now();
    let mut v = Virtualizer::new(detached_settings(10));

    boot(&mut v, &mut page, now);
    settle(&mut v, &mut page, &mut now);
    assert_eq!(v.status().collapsed, 15);

    // Host inserts an old turn mid-history (e.g. lazy-loaded backlog).
    page.insert_turn_at(0, &TurnSpec::new(100.0, "turn -1"));
    settle(&mut v, &mut page, &mut now);

    let status = v.status();
    assert_eq!(status.tracked, 26);
    assert_eq!(status.collapsed, 16, "the insert is outside the tail");
}
