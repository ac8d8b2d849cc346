/*
 *  lib.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Display mode scheduling engine for an unattended slideshow screen
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

pub mod config;
pub mod motion;
pub mod power;
pub mod report;
pub mod schedule;
pub mod scheduler;
pub mod sequencer;

// Re-exports for convenience
pub use config::{Config, Mode};
pub use motion::{MotionInput, MotionSource, MotionState};
pub use power::{PowerBackend, PowerError, ScreenPower};
pub use report::{Fault, FaultSink, LogSink};
pub use schedule::WorkWindow;
pub use scheduler::{
    decide, Decision, DisplayEvent, DisplayScheduler, Limits, PowerAction, SessionConfig, Snapshot,
};
pub use sequencer::{ImageSequencer, Order};
