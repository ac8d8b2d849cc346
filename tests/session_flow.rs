/*
 *  tests/session_flow.rs
 *
 *  End-to-end session tests against recording backends
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 */

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

use vitrine::config::Mode;
use vitrine::motion::{MotionInput, MotionSource};
use vitrine::power::{PowerBackend, ScreenPower};
use vitrine::report::CollectingSink;
use vitrine::schedule::WorkWindow;
use vitrine::scheduler::{DisplayEvent, DisplayScheduler, SessionConfig};
use vitrine::sequencer::{ImageSequencer, Order};

const TICK: Duration = Duration::from_millis(20);
const MOTION_POLL: Duration = Duration::from_millis(10);

fn image_dir(names: &[&str]) -> TempDir {
    let dir = tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    dir
}

struct Harness {
    scheduler: DisplayScheduler,
    commands: Arc<Mutex<Vec<bool>>>,
    faults: Arc<CollectingSink>,
    events: mpsc::UnboundedReceiver<DisplayEvent>,
}

fn harness(
    mode: Mode,
    window: WorkWindow,
    motion: Option<MotionSource>,
    screen_timeout: Duration,
    image_dwell: Duration,
    folder: &Path,
) -> Harness {
    let (backend, commands) = PowerBackend::recording();
    let (events_tx, events) = mpsc::unbounded_channel();
    let faults = Arc::new(CollectingSink::default());
    let cfg = SessionConfig {
        mode,
        screen_timeout,
        image_dwell,
        show_status: true,
        tick_interval: TICK,
    };
    let scheduler = DisplayScheduler::new(
        cfg,
        window,
        motion,
        ScreenPower::with_cooldown(backend, Duration::ZERO),
        ImageSequencer::new(folder, Order::Sequential),
        events_tx,
        faults.clone(),
    );
    Harness {
        scheduler,
        commands,
        faults,
        events,
    }
}

/// A window that is guaranteed to contain "now" for the next hour.
fn window_around_now() -> WorkWindow {
    let now = Local::now().time();
    WorkWindow::from_times(true, now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
}

/// A window that is guaranteed NOT to contain "now".
fn window_away_from_now() -> WorkWindow {
    let now = Local::now().time();
    WorkWindow::from_times(true, now + chrono::Duration::hours(2), now + chrono::Duration::hours(3))
}

async fn run_for(mut h: Harness, steps: Vec<(Duration, Box<dyn Fn() + Send>)>) -> Harness {
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        h.scheduler.run(stop_rx).await;
        h
    });
    for (pause, action) in steps {
        tokio::time::sleep(pause).await;
        action();
    }
    let _ = stop_tx.send(()).await;
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("session stops promptly")
        .expect("session task completes")
}

fn drain(h: &mut Harness) -> (Vec<std::path::PathBuf>, Vec<String>) {
    let mut images = Vec::new();
    let mut statuses = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        match event {
            DisplayEvent::ShowImage(path) => images.push(path),
            DisplayEvent::Status(text) => statuses.push(text),
        }
    }
    (images, statuses)
}

#[tokio::test]
async fn continuous_session_powers_on_and_cycles_images() {
    let dir = image_dir(&["a.jpg", "b.jpg", "c.jpg"]);
    let h = harness(
        Mode::Continuous,
        WorkWindow::from_times(false, Local::now().time(), Local::now().time()),
        None,
        Duration::from_secs(10),
        Duration::from_millis(80),
        dir.path(),
    );

    let mut h = run_for(h, vec![(Duration::from_millis(400), Box::new(|| {}))]).await;
    let (images, _) = drain(&mut h);

    // screen forced on at start and again at teardown; never off in between
    assert_eq!(*h.commands.lock().unwrap(), vec![true, true]);
    assert!(h.faults.drain().is_empty());

    // images advance every dwell period, in sorted order, wrapping around
    assert!(images.len() >= 3, "expected at least one full cycle, got {}", images.len());
    let names: Vec<_> = images
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(&names[..3], &["a.jpg", "b.jpg", "c.jpg"]);
}

#[tokio::test]
async fn pir_session_times_out_then_wakes_on_motion() {
    let dir = tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let motion = MotionSource::new(MotionInput::Shared(flag.clone())).with_poll_interval(MOTION_POLL);

    let h = harness(
        Mode::Pir,
        WorkWindow::from_times(false, Local::now().time(), Local::now().time()),
        Some(motion),
        Duration::from_millis(200),
        Duration::from_secs(10),
        dir.path(),
    );

    let wake = flag.clone();
    let mut h = run_for(
        h,
        vec![
            // let the inactivity timeout fire
            (Duration::from_millis(300), Box::new(move || {
                wake.store(true, Ordering::Relaxed);
            })),
            // give the edge time to propagate, then stop before a second timeout
            (Duration::from_millis(80), Box::new(|| {})),
        ],
    )
    .await;

    // on (start), off (timeout), on (motion edge), on (teardown)
    assert_eq!(*h.commands.lock().unwrap(), vec![true, false, true, true]);
    assert!(h.faults.drain().is_empty());

    let (_, statuses) = drain(&mut h);
    assert!(
        statuses.iter().any(|s| s.contains("motion timeout")),
        "expected a timeout status, got {statuses:?}"
    );
    assert!(
        statuses.iter().any(|s| s.contains("motion detected")),
        "expected a motion status, got {statuses:?}"
    );
}

#[tokio::test]
async fn time_mode_off_hours_turns_screen_off_and_never_advances() {
    let dir = image_dir(&["a.jpg", "b.jpg"]);
    let h = harness(
        Mode::Time,
        window_away_from_now(),
        None,
        Duration::from_secs(10),
        Duration::from_millis(50),
        dir.path(),
    );

    let mut h = run_for(h, vec![(Duration::from_millis(200), Box::new(|| {}))]).await;
    let (images, statuses) = drain(&mut h);

    // on (start), off (first tick, off-hours), on (teardown)
    assert_eq!(*h.commands.lock().unwrap(), vec![true, false, true]);
    assert!(images.is_empty(), "no advances outside work hours: {images:?}");
    assert!(statuses.iter().any(|s| s.contains("OFF HOURS")));
}

#[tokio::test]
async fn time_mode_work_hours_keeps_screen_on_and_advances() {
    let dir = image_dir(&["a.jpg", "b.jpg"]);
    let h = harness(
        Mode::Time,
        window_around_now(),
        None,
        Duration::from_secs(10),
        Duration::from_millis(60),
        dir.path(),
    );

    let mut h = run_for(h, vec![(Duration::from_millis(300), Box::new(|| {}))]).await;
    let (images, statuses) = drain(&mut h);

    // never switched off during the session
    assert_eq!(*h.commands.lock().unwrap(), vec![true, true]);
    assert!(images.len() >= 2, "expected advances during work hours");
    assert!(statuses.iter().any(|s| s.contains("WORK HOURS")));
}

#[tokio::test]
async fn time_pir_off_hours_behaves_like_pir() {
    let dir = tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let motion = MotionSource::new(MotionInput::Shared(flag.clone())).with_poll_interval(MOTION_POLL);

    let h = harness(
        Mode::TimePir,
        window_away_from_now(),
        Some(motion),
        Duration::from_millis(200),
        Duration::from_secs(10),
        dir.path(),
    );

    let wake = flag.clone();
    let h = run_for(
        h,
        vec![
            (Duration::from_millis(300), Box::new(move || {
                wake.store(true, Ordering::Relaxed);
            })),
            (Duration::from_millis(80), Box::new(|| {})),
        ],
    )
    .await;

    assert_eq!(*h.commands.lock().unwrap(), vec![true, false, true, true]);
}

#[tokio::test]
async fn empty_folder_reports_no_images_and_keeps_ticking() {
    let dir = tempdir().unwrap();
    let h = harness(
        Mode::Continuous,
        WorkWindow::from_times(false, Local::now().time(), Local::now().time()),
        None,
        Duration::from_secs(10),
        Duration::from_millis(40),
        dir.path(),
    );

    let mut h = run_for(h, vec![(Duration::from_millis(200), Box::new(|| {}))]).await;
    let (images, statuses) = drain(&mut h);

    assert!(images.is_empty());
    assert!(
        statuses.iter().any(|s| s.contains("no images found")),
        "expected a no-images status, got {statuses:?}"
    );
    // the session still shut down cleanly with the screen on
    assert_eq!(h.commands.lock().unwrap().last(), Some(&true));
}
