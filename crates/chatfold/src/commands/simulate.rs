//! Scripted conversation replay against the in-memory page.
//!
//! Models a reader parked at the bottom of a live chat: user turns land
//! whole, assistant turns stream in chunks, and the driver forwards the
//! page's feeds to the engine on a virtual clock. No wall-clock time
//! passes; deadlines are stepped through explicitly.

use std::io::Write;
use std::time::{Duration, Instant};

use eyre::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use chatfold_engine::Virtualizer;
use chatfold_host::{Settings, SimPage, TurnSpec};

const VIEWPORT_HEIGHT: f64 = 600.0;

pub fn run(
    settings: Settings,
    turns: usize,
    seed: u64,
    toggle: bool,
    verbose: bool,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    let policy = settings.policy;
    let tail = settings.tail_size;

    let mut page = SimPage::new(VIEWPORT_HEIGHT);
    let mut engine = Virtualizer::new(settings);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut now = Instant::now();
    let mut authored_height = 0.0f64;

    engine.boot(&mut page, now);

    for index in 0..turns {
        if toggle && index == turns / 2 {
            engine.set_enabled(&mut page, false, now);
            step(&mut engine, &mut page, &mut now, 120);
            writeln!(
                stdout,
                "toggled off at turn {index}: {} folded",
                engine.status().collapsed
            )?;
            engine.set_enabled(&mut page, true, now);
            step(&mut engine, &mut page, &mut now, 120);
        }
        let is_user = index % 2 == 0;
        if is_user {
            let height = rng.gen_range(40.0..=160.0);
            page.append_turn(&TurnSpec::new(height, format!("user message {index}")));
            authored_height += height;
            page.scroll_to(f64::MAX);
            step(&mut engine, &mut page, &mut now, 120);
        } else {
            authored_height += stream_assistant_turn(
                &mut engine,
                &mut page,
                &mut rng,
                &mut now,
                index,
            );
        }
        // Reader idles long enough for the stream lock to clear.
        for _ in 0..6 {
            step(&mut engine, &mut page, &mut now, 110);
        }
        if verbose {
            let status = engine.status();
            writeln!(
                stdout,
                "turn {index:>3}: {} tracked, {} folded{}",
                status.tracked,
                status.collapsed,
                if status.locked { " (locked)" } else { "" }
            )?;
        }
    }

    drain(&mut engine, &mut page, &mut now);

    let status = engine.status();
    info!(?status, "simulation finished");
    writeln!(
        stdout,
        "replayed {turns} turns ({policy} policy, tail {tail})"
    )?;
    writeln!(
        stdout,
        "tracked {} items, {} folded",
        status.tracked, status.collapsed
    )?;
    writeln!(
        stdout,
        "document height {:.0}px of {:.0}px authored",
        page.content_height(),
        authored_height
    )?;
    writeln!(stdout, "{}", status.summary())?;
    Ok(())
}

/// Append one assistant turn and stream its content in chunks. Returns
/// the turn's final height.
fn stream_assistant_turn(
    engine: &mut Virtualizer,
    page: &mut SimPage,
    rng: &mut StdRng,
    now: &mut Instant,
    index: usize,
) -> f64 {
    let id = page.append_turn(&TurnSpec::new(24.0, format!("assistant {index}: ")).streaming());
    page.scroll_to(f64::MAX);
    step(engine, page, now, 60);

    let chunks = rng.gen_range(3..=8);
    let mut height = 24.0;
    for chunk in 0..chunks {
        height += rng.gen_range(12.0..=48.0);
        page.append_text(id, &format!("chunk {chunk} "), height);
        page.scroll_to(f64::MAX);
        step(engine, page, now, rng.gen_range(60..=150));
    }

    page.set_status(id, "done");
    step(engine, page, now, 60);
    height
}

fn step(engine: &mut Virtualizer, page: &mut SimPage, now: &mut Instant, ms: u64) {
    *now += Duration::from_millis(ms);
    engine.service(page, *now);
}

/// Run the engine until its deadlines stop producing changes.
fn drain(engine: &mut Virtualizer, page: &mut SimPage, now: &mut Instant) {
    for _ in 0..40 {
        engine.service(page, *now);
        match engine.next_deadline() {
            Some(deadline) if deadline > *now => *now = deadline,
            _ => *now += Duration::from_millis(50),
        }
    }
}
