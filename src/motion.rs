/*
 *  motion.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  PIR motion source - polls a digital input on a background task and
 *  turns raw level reads into rising/falling edge notifications
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

use log::{debug, error, info, warn};
use rppal::gpio::{Gpio, InputPin, Level};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Sensor poll period. Edge detection is single-sample; the poll interval
/// itself is the only debounce.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop()` waits for the polling task before giving up silently.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Back-off after a failed sensor read before polling resumes.
const READ_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Latest observed sensor state. Written only by the polling task.
#[derive(Debug, Clone, Copy)]
pub struct MotionState {
    pub detected: bool,
    /// Refreshed on each rising edge; the inactivity timeout counts from here.
    pub last_transition: Instant,
}

/// The physical (or substitute) signal behind a [`MotionSource`].
pub enum MotionInput {
    /// PIR data line on a BCM pin, pulled down, high while motion is seen.
    Gpio { pin: InputPin, bcm: u8 },
    /// No usable sensor hardware; reads as permanently inactive.
    Disabled,
    /// Process-local signal, for tests and dry runs.
    Shared(Arc<AtomicBool>),
}

impl MotionInput {
    /// Open the PIR pin, degrading to [`MotionInput::Disabled`] when the GPIO
    /// chip is unavailable (not a Raspberry Pi, missing permissions, ...).
    pub fn open(bcm: u8) -> Self {
        match Gpio::new().and_then(|gpio| gpio.get(bcm)) {
            Ok(pin) => {
                info!("PIR sensor initialized on BCM pin {bcm}");
                MotionInput::Gpio {
                    pin: pin.into_input_pulldown(),
                    bcm,
                }
            }
            Err(e) => {
                warn!("GPIO unavailable ({e}) - motion sensing disabled");
                MotionInput::Disabled
            }
        }
    }

    fn read(&mut self) -> Result<bool, MotionError> {
        match self {
            MotionInput::Gpio { pin, .. } => Ok(pin.read() == Level::High),
            MotionInput::Disabled => Ok(false),
            MotionInput::Shared(flag) => Ok(flag.load(Ordering::Relaxed)),
        }
    }

    fn is_available(&self) -> bool {
        !matches!(self, MotionInput::Disabled)
    }
}

/// Probe whether a PIR sensor pin can be opened and read at all.
///
/// Used by callers to decide which display modes to offer; the result is
/// informational, never an error.
pub fn probe(bcm: u8) -> bool {
    match Gpio::new().and_then(|gpio| gpio.get(bcm)) {
        Ok(pin) => {
            let _ = pin.into_input_pulldown().read();
            info!("PIR sensor detected on BCM pin {bcm}");
            true
        }
        Err(e) => {
            warn!("no PIR sensor on BCM pin {bcm}: {e}");
            false
        }
    }
}

/// Polls a [`MotionInput`] on its own task and exposes the latest state plus
/// a watch channel that carries rising (`true`) and falling (`false`) edges.
pub struct MotionSource {
    state: Arc<Mutex<MotionState>>,
    edges_tx: watch::Sender<bool>,
    edges_rx: watch::Receiver<bool>,
    available: bool,
    poll_interval: Duration,
    input: Option<MotionInput>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MotionSource {
    pub fn new(input: MotionInput) -> Self {
        let (edges_tx, edges_rx) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MotionState {
                detected: false,
                last_transition: Instant::now(),
            })),
            edges_tx,
            edges_rx,
            available: input.is_available(),
            poll_interval: POLL_INTERVAL,
            input: Some(input),
            stop_tx: None,
            handle: None,
        }
    }

    /// Open the given BCM pin and wrap it; degraded when GPIO is absent.
    pub fn open(bcm: u8) -> Self {
        Self::new(MotionInput::open(bcm))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// False when running in degraded "always inactive" mode.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Most recently observed state; never blocks beyond a short mutex.
    pub fn state(&self) -> MotionState {
        *lock_state(&self.state)
    }

    /// Edge notifications: `true` on motion begin, `false` on motion end.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.edges_rx.clone()
    }

    /// Begin polling. A second call while running is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let mut input = match self.input.take() {
            Some(input) => input,
            None => {
                warn!("motion source already consumed; not restarting");
                return;
            }
        };

        // baseline "now" so a fresh session never times out instantly
        lock_state(&self.state).last_transition = Instant::now();

        let state = Arc::clone(&self.state);
        let edges = self.edges_tx.clone();
        let period = self.poll_interval;
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        self.stop_tx = Some(stop_tx);

        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        match input.read() {
                            Ok(high) => emit_edge(&state, &edges, high),
                            Err(e) => {
                                // transient: no state change, keep polling
                                error!("sensor read failed: {e}");
                                tokio::time::sleep(READ_BACKOFF).await;
                            }
                        }
                    }
                    _ = stop_rx.recv() => {
                        debug!("motion polling task received stop signal");
                        break;
                    }
                }
            }
        }));
        info!("motion polling started ({period:?} interval)");
    }

    /// Stop polling, waiting up to 2 s for the task to quiesce. Giving up
    /// after the grace period is logged but not fatal.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
                warn!("motion polling task did not stop within {STOP_GRACE:?}");
            } else {
                info!("motion polling stopped");
            }
        }
    }
}

impl Drop for MotionSource {
    fn drop(&mut self) {
        // best effort; a still-running task exits at its next poll
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

fn emit_edge(state: &Arc<Mutex<MotionState>>, edges: &watch::Sender<bool>, high: bool) {
    let mut st = lock_state(state);
    if high && !st.detected {
        st.detected = true;
        st.last_transition = Instant::now();
        drop(st);
        info!("motion detected");
        let _ = edges.send(true);
    } else if !high && st.detected {
        st.detected = false;
        drop(st);
        info!("motion ended");
        let _ = edges.send(false);
    }
}

fn lock_state(state: &Arc<Mutex<MotionState>>) -> MutexGuard<'_, MotionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_POLL: Duration = Duration::from_millis(10);
    const EDGE_WAIT: Duration = Duration::from_millis(500);

    async fn next_edge(rx: &mut watch::Receiver<bool>) -> bool {
        tokio::time::timeout(EDGE_WAIT, rx.changed())
            .await
            .expect("edge arrives in time")
            .expect("edge channel open");
        *rx.borrow()
    }

    #[tokio::test]
    async fn shared_input_produces_rising_and_falling_edges() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut source =
            MotionSource::new(MotionInput::Shared(flag.clone())).with_poll_interval(TEST_POLL);
        let mut edges = source.subscribe();
        source.start();

        flag.store(true, Ordering::Relaxed);
        assert!(next_edge(&mut edges).await);
        assert!(source.state().detected);

        flag.store(false, Ordering::Relaxed);
        assert!(!next_edge(&mut edges).await);
        assert!(!source.state().detected);

        source.stop().await;
    }

    #[tokio::test]
    async fn rising_edge_refreshes_transition_instant() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut source =
            MotionSource::new(MotionInput::Shared(flag.clone())).with_poll_interval(TEST_POLL);
        let mut edges = source.subscribe();
        source.start();

        let before = source.state().last_transition;
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.store(true, Ordering::Relaxed);
        next_edge(&mut edges).await;

        assert!(source.state().last_transition > before);
        source.stop().await;
    }

    #[tokio::test]
    async fn disabled_input_is_degraded_and_inactive() {
        let mut source = MotionSource::new(MotionInput::Disabled).with_poll_interval(TEST_POLL);
        assert!(!source.is_available());
        source.start();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!source.state().detected);

        source.stop().await;
    }

    #[tokio::test]
    async fn stop_is_prompt_and_repeatable() {
        let mut source = MotionSource::new(MotionInput::Disabled).with_poll_interval(TEST_POLL);
        source.start();

        let begun = Instant::now();
        source.stop().await;
        assert!(begun.elapsed() < STOP_GRACE);

        // second stop is a harmless no-op
        source.stop().await;
    }
}
