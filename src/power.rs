/*
 *  power.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Screen power sink - rate-limited HDMI power commands with a soft
 *  fallback when no control mechanism exists on the host
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

use log::{info, warn};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Minimum interval between successive power commands of either kind.
pub const COMMAND_COOLDOWN: Duration = Duration::from_secs(1);

/// Hard ceiling on a single hardware power command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("power command timed out after {0:?}")]
    Timeout(Duration),
    #[error("power command failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The mechanism a [`ScreenPower`] drives.
pub enum PowerBackend {
    /// `vcgencmd display_power`, plus `xset dpms force` when X is around.
    Hdmi,
    /// No physical control; state is tracked logically and always succeeds.
    Assumed,
    /// Records every issued command. For tests and dry runs.
    Recording(Arc<Mutex<Vec<bool>>>),
}

impl PowerBackend {
    /// A recording backend together with its command log.
    pub fn recording() -> (Self, Arc<Mutex<Vec<bool>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (PowerBackend::Recording(Arc::clone(&log)), log)
    }

    async fn apply(&self, on: bool) -> Result<(), PowerError> {
        match self {
            PowerBackend::Hdmi => {
                let arg = if on { "1" } else { "0" };
                match run_command("vcgencmd", &["display_power", arg]).await {
                    Ok(()) => {}
                    Err(PowerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                        // not a Raspberry Pi; nothing to enforce physically
                        warn!("vcgencmd not found - assuming no display power control");
                    }
                    Err(e) => return Err(e),
                }

                if std::env::var_os("DISPLAY").is_some() {
                    let arg = if on { "on" } else { "off" };
                    match run_command("xset", &["dpms", "force", arg]).await {
                        Ok(()) => {}
                        Err(PowerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                            warn!("xset not found - skipping DPMS");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            PowerBackend::Assumed => Ok(()),
            PowerBackend::Recording(log) => {
                log.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(on);
                Ok(())
            }
        }
    }
}

async fn run_command(program: &str, args: &[&str]) -> Result<(), PowerError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    match tokio::time::timeout(COMMAND_TIMEOUT, child.wait()).await {
        Ok(status) => {
            // a nonzero exit is tolerated; only spawn/wait I/O errors count
            let _ = status?;
            Ok(())
        }
        Err(_) => {
            let _ = child.kill().await;
            Err(PowerError::Timeout(COMMAND_TIMEOUT))
        }
    }
}

/// Idempotent, rate-limited screen power control.
///
/// Tracks the last believed state rather than querying hardware. A command
/// inside the cooldown window is a successful no-op; a failed hardware
/// command leaves the recorded state untouched.
pub struct ScreenPower {
    backend: PowerBackend,
    cooldown: Duration,
    on: bool,
    last_command: Option<Instant>,
}

impl ScreenPower {
    pub fn new(backend: PowerBackend) -> Self {
        Self::with_cooldown(backend, COMMAND_COOLDOWN)
    }

    pub fn with_cooldown(backend: PowerBackend, cooldown: Duration) -> Self {
        Self {
            backend,
            cooldown,
            // the screen is assumed on when a session begins
            on: true,
            last_command: None,
        }
    }

    pub fn hdmi() -> Self {
        Self::new(PowerBackend::Hdmi)
    }

    /// Last known/assumed state; not re-queried from hardware.
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub async fn turn_on(&mut self) -> Result<(), PowerError> {
        self.set(true).await
    }

    pub async fn turn_off(&mut self) -> Result<(), PowerError> {
        self.set(false).await
    }

    pub async fn toggle(&mut self) -> Result<(), PowerError> {
        self.set(!self.on).await
    }

    /// Turn the screen on regardless of the cooldown. Used at session end so
    /// the configuration view is always visible.
    pub async fn force_on(&mut self) -> Result<(), PowerError> {
        self.last_command = None;
        self.set(true).await
    }

    async fn set(&mut self, on: bool) -> Result<(), PowerError> {
        if let Some(t) = self.last_command {
            if t.elapsed() < self.cooldown {
                return Ok(());
            }
        }
        self.last_command = Some(Instant::now());
        self.backend.apply(on).await?;
        self.on = on;
        info!("screen turned {}", if on { "on" } else { "off" });
        Ok(())
    }

    #[cfg(test)]
    fn expire_cooldown(&mut self) {
        self.last_command = None;
    }
}
