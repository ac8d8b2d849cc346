/*
 *  scheduler.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Display scheduler - reconciles motion, the work window, and the
 *  configured mode into screen power commands and image advances
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use crate::config::{Config, Mode};
use crate::motion::MotionSource;
use crate::power::{PowerError, ScreenPower};
use crate::report::{Fault, FaultSink, LogSink};
use crate::schedule::WorkWindow;
use crate::sequencer::{ImageSequencer, Order};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Fixed decision period of the scheduling loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing of directory rescans while the sequence is empty.
const EMPTY_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Power(#[from] PowerError),
}

/// Per-session parameters, fixed for the scheduler's lifetime.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: Mode,
    pub screen_timeout: Duration,
    pub image_dwell: Duration,
    pub show_status: bool,
    pub tick_interval: Duration,
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            mode: cfg.mode,
            screen_timeout: Duration::from_secs(cfg.screen_timeout_secs),
            image_dwell: Duration::from_secs(cfg.image_dwell_secs),
            show_status: cfg.show_status,
            tick_interval: TICK_INTERVAL,
        }
    }
}

/// Everything one tick's decision depends on. Recomputed every tick, never
/// persisted; `decide` is a pure function of this plus [`Limits`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub mode: Mode,
    pub work_time: bool,
    pub motion_active: bool,
    pub screen_on: bool,
    pub seconds_since_motion: f64,
    pub seconds_since_image: f64,
}

/// Thresholds the decision compares elapsed times against.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub screen_timeout: f64,
    pub image_dwell: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub power: PowerAction,
    pub advance: bool,
}

/// The per-tick decision table.
///
/// Power, by mode:
/// - `Pir`: off once the motion timeout has elapsed; never on from a tick
///   (the motion notification path powers on with sub-tick latency).
/// - `Time`: on during work hours, off outside them.
/// - `Continuous`: on whenever off, never off.
/// - `TimePir`: work hours force on; off-hours use the Pir timeout.
///
/// Advance requires both the mode's display predicate (evaluated against the
/// screen state as it will be after this tick's power action) and an elapsed
/// image dwell.
pub fn decide(snapshot: &Snapshot, limits: &Limits) -> Decision {
    let power = match snapshot.mode {
        Mode::Pir => pir_power(snapshot, limits),
        Mode::Time => window_power(snapshot),
        Mode::Continuous => {
            if snapshot.screen_on {
                PowerAction::Unchanged
            } else {
                PowerAction::On
            }
        }
        Mode::TimePir => {
            if snapshot.work_time {
                if snapshot.screen_on {
                    PowerAction::Unchanged
                } else {
                    PowerAction::On
                }
            } else {
                pir_power(snapshot, limits)
            }
        }
    };

    let screen_after = match power {
        PowerAction::On => true,
        PowerAction::Off => false,
        PowerAction::Unchanged => snapshot.screen_on,
    };

    let wants_display = match snapshot.mode {
        Mode::Pir => screen_after,
        Mode::Time => snapshot.work_time,
        Mode::Continuous => true,
        Mode::TimePir => snapshot.work_time || screen_after,
    };

    Decision {
        power,
        advance: wants_display && snapshot.seconds_since_image >= limits.image_dwell,
    }
}

fn pir_power(snapshot: &Snapshot, limits: &Limits) -> PowerAction {
    if snapshot.screen_on && snapshot.seconds_since_motion > limits.screen_timeout {
        PowerAction::Off
    } else {
        PowerAction::Unchanged
    }
}

fn window_power(snapshot: &Snapshot) -> PowerAction {
    if snapshot.work_time {
        if snapshot.screen_on {
            PowerAction::Unchanged
        } else {
            PowerAction::On
        }
    } else if snapshot.screen_on {
        PowerAction::Off
    } else {
        PowerAction::Unchanged
    }
}

/// What the engine hands to the presentation layer. Rendering happens
/// entirely on the other side of this channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    ShowImage(PathBuf),
    Status(String),
}

/// Orchestrates one display session: a 100 ms tick loop over the motion
/// state, the work window, and the configured mode, issuing at most one
/// power command per tick plus dwell-gated image advances.
pub struct DisplayScheduler {
    cfg: SessionConfig,
    window: WorkWindow,
    motion: Option<MotionSource>,
    power: ScreenPower,
    sequencer: ImageSequencer,
    events: mpsc::UnboundedSender<DisplayEvent>,
    faults: Arc<dyn FaultSink>,
    session_start: Instant,
    /// None means the dwell is treated as already elapsed.
    last_image_change: Option<Instant>,
    last_empty_rescan: Option<Instant>,
    detail: String,
    last_status: String,
}

impl DisplayScheduler {
    pub fn new(
        cfg: SessionConfig,
        window: WorkWindow,
        motion: Option<MotionSource>,
        power: ScreenPower,
        sequencer: ImageSequencer,
        events: mpsc::UnboundedSender<DisplayEvent>,
        faults: Arc<dyn FaultSink>,
    ) -> Self {
        Self {
            cfg,
            window,
            motion,
            power,
            sequencer,
            events,
            faults,
            session_start: Instant::now(),
            last_image_change: None,
            last_empty_rescan: None,
            detail: String::new(),
            last_status: String::new(),
        }
    }

    /// Production wiring: HDMI power, GPIO motion input (for the modes that
    /// use one), folder-backed sequencer, log-based fault sink.
    pub fn from_config(cfg: &Config, events: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        let window = WorkWindow::new(cfg.mode.uses_window(), &cfg.work_start, &cfg.work_end);
        let motion = if cfg.mode.uses_motion() {
            Some(MotionSource::open(cfg.pir_pin))
        } else {
            None
        };
        let order = if cfg.random_order {
            Order::Shuffled
        } else {
            Order::Sequential
        };
        Self::new(
            SessionConfig::from_config(cfg),
            window,
            motion,
            ScreenPower::hdmi(),
            ImageSequencer::new(&cfg.image_folder, order),
            events,
            Arc::new(LogSink),
        )
    }

    pub fn mode(&self) -> Mode {
        self.cfg.mode
    }

    /// Run the session until a stop signal arrives, then tear down.
    /// Errors inside a tick are reported and the tick is skipped; this loop
    /// itself never fails.
    pub async fn run(&mut self, mut stop_rx: mpsc::Receiver<()>) {
        self.start_session().await;

        let mut edges = self.motion.as_ref().map(|m| m.subscribe());
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.tick_interval) => {
                    if let Err(e) = self.tick().await {
                        let snapshot = self.snapshot();
                        self.faults.report(&Fault {
                            phase: "tick",
                            mode: self.cfg.mode,
                            snapshot: Some(&snapshot),
                            error: e.to_string(),
                        });
                    }
                }
                edge = edge_changed(&mut edges) => {
                    match edge {
                        Some(true) => self.on_motion_began().await,
                        Some(false) => self.set_detail("no motion"),
                        None => edges = None,
                    }
                }
                _ = stop_rx.recv() => break,
            }
        }

        self.end_session().await;
    }

    async fn start_session(&mut self) {
        info!("display session starting (mode {})", self.cfg.mode);
        self.session_start = Instant::now();
        // dwell treated as elapsed: the first image shows on the first tick
        self.last_image_change = None;
        self.detail.clear();
        self.last_status.clear();

        if let Err(e) = self.power.force_on().await {
            self.faults.report(&Fault {
                phase: "session-start",
                mode: self.cfg.mode,
                snapshot: None,
                error: e.to_string(),
            });
        }
        if let Some(motion) = self.motion.as_mut() {
            motion.start();
        }
        info!("slideshow started");
    }

    async fn end_session(&mut self) {
        info!("display session ending");
        if let Some(motion) = self.motion.as_mut() {
            motion.stop().await;
        }
        // the configuration view must be visible after the session
        if let Err(e) = self.power.force_on().await {
            self.faults.report(&Fault {
                phase: "session-end",
                mode: self.cfg.mode,
                snapshot: None,
                error: e.to_string(),
            });
        }
        info!("slideshow stopped");
    }

    /// One decision cycle. Kept fallible so the run loop can report and
    /// continue; only power commands can actually fail here.
    async fn tick(&mut self) -> Result<(), SchedulerError> {
        let snapshot = self.snapshot();
        let decision = decide(&snapshot, &self.limits());

        match decision.power {
            PowerAction::On => {
                self.power.turn_on().await?;
                match self.cfg.mode {
                    Mode::Time | Mode::TimePir => {
                        info!("work hours - turning screen on");
                        self.set_detail("work hours - continuous loop");
                    }
                    _ => {
                        info!("turning screen on");
                        self.set_detail("screen on");
                    }
                }
            }
            PowerAction::Off => {
                self.power.turn_off().await?;
                match self.cfg.mode {
                    Mode::Pir => {
                        info!("motion timeout reached - turning screen off");
                        self.set_detail("screen off (motion timeout)");
                    }
                    Mode::TimePir => {
                        info!("off hours and motion timeout - turning screen off");
                        self.set_detail("off hours - screen off (motion timeout)");
                    }
                    _ => {
                        info!("off hours - turning screen off");
                        self.set_detail("off hours - screen off");
                    }
                }
            }
            PowerAction::Unchanged => {}
        }

        if decision.advance {
            self.advance_image();
        }

        if self.cfg.show_status {
            let line = self.status_line(&snapshot);
            self.emit_if_changed(line);
        }
        Ok(())
    }

    /// Immediate reaction to a rising motion edge, outside the tick cadence.
    /// Does not touch the image dwell baseline; power and dwell timers are
    /// independent.
    async fn on_motion_began(&mut self) {
        debug!("motion notification received");
        if !self.power.is_on() {
            info!("motion detected - turning screen on");
            if let Err(e) = self.power.turn_on().await {
                self.faults.report(&Fault {
                    phase: "motion",
                    mode: self.cfg.mode,
                    snapshot: None,
                    error: e.to_string(),
                });
                return;
            }
            self.set_detail("motion detected - screen on");
        } else {
            self.set_detail("motion detected");
        }
    }

    fn advance_image(&mut self) {
        if self.sequencer.is_empty() {
            // on-demand rescan so images dropped in later are picked up,
            // spaced out so an empty folder is not hammered every tick
            let due = self
                .last_empty_rescan
                .map(|t| t.elapsed() >= EMPTY_RESCAN_INTERVAL)
                .unwrap_or(true);
            if due {
                self.last_empty_rescan = Some(Instant::now());
                self.sequencer.reload();
            }
        }
        match self.sequencer.next() {
            Some(path) => {
                self.last_image_change = Some(Instant::now());
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                self.detail = format!(
                    "image {}/{} - {}",
                    self.sequencer.position(),
                    self.sequencer.len(),
                    name
                );
                debug!("showing image: {name}");
                let _ = self.events.send(DisplayEvent::ShowImage(path));
            }
            None => {
                // baseline stays put; we retry on the next tick
                if self.detail != "no images found" {
                    warn!("no images in {}", self.sequencer.folder().display());
                    self.detail = "no images found".to_string();
                }
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let (motion_active, seconds_since_motion) = match self.motion.as_ref() {
            Some(motion) => {
                let state = motion.state();
                (state.detected, state.last_transition.elapsed().as_secs_f64())
            }
            None => (false, self.session_start.elapsed().as_secs_f64()),
        };
        Snapshot {
            mode: self.cfg.mode,
            work_time: self.cfg.mode.uses_window() && self.window.is_work_time(),
            motion_active,
            screen_on: self.power.is_on(),
            seconds_since_motion,
            seconds_since_image: self
                .last_image_change
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(f64::INFINITY),
        }
    }

    fn limits(&self) -> Limits {
        Limits {
            screen_timeout: self.cfg.screen_timeout.as_secs_f64(),
            image_dwell: self.cfg.image_dwell.as_secs_f64(),
        }
    }

    fn status_line(&self, snapshot: &Snapshot) -> String {
        let mode_info = match self.cfg.mode {
            Mode::Pir => {
                if self.motion.as_ref().is_some_and(|m| m.is_available()) {
                    "MODE: motion control (PIR sensor)".to_string()
                } else {
                    "MODE: motion control (sensor unavailable)".to_string()
                }
            }
            Mode::Time => self.window.description(),
            Mode::Continuous => "MODE: continuous loop (24/7)".to_string(),
            Mode::TimePir => format!("{} + PIR", self.window.description()),
        };
        let screen = if snapshot.screen_on { "screen ON" } else { "screen OFF" };
        if self.detail.is_empty() {
            format!("{mode_info} | {screen}")
        } else {
            format!("{mode_info} | {screen} | {}", self.detail)
        }
    }

    fn set_detail(&mut self, detail: &str) {
        self.detail = detail.to_string();
    }

    fn emit_if_changed(&mut self, line: String) {
        if line != self.last_status {
            self.last_status = line.clone();
            let _ = self.events.send(DisplayEvent::Status(line));
        }
    }
}

async fn edge_changed(rx: &mut Option<watch::Receiver<bool>>) -> Option<bool> {
    match rx.as_mut() {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
